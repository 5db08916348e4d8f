pub mod charts;
pub mod config;
pub mod constants;
pub mod data;
pub mod env;
pub mod error;
pub mod experiment;
pub mod logging;
pub mod pairs;
pub mod tracking;
pub mod types;
pub mod utils;
