pub mod theme;
pub mod trajectory;
mod utils;

pub use trajectory::TrajectoryFigure;
