pub mod local;
#[cfg(feature = "python")]
pub mod wandb;

use serde::{Deserialize, Serialize};

use crate::{
    charts::TrajectoryFigure,
    constants::metrics::{
        FINAL_ANNUAL_RETURN, FINAL_ANNUAL_VOLATILITY, FINAL_MAX_DRAWDOWN, FINAL_REWARD,
        FINAL_SHARPE_RATIO, TRAJECTORY_FIGURE,
    },
    env::StepOutcome,
    error::TrackingError,
};

/// Final metrics of the evaluation episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalMetrics {
    pub reward: f64,
    pub sharpe_ratio: f64,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub max_drawdown: f64,
}

impl From<&StepOutcome> for FinalMetrics {
    fn from(outcome: &StepOutcome) -> Self {
        Self {
            reward: outcome.reward,
            sharpe_ratio: outcome.info.sharpe_ratio,
            annual_return: outcome.info.annual_return,
            annual_volatility: outcome.info.annual_volatility,
            max_drawdown: outcome.info.max_drawdown,
        }
    }
}

/// Everything one run reports, keyed by the evaluated environment's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub env_name: String,
    pub metrics: FinalMetrics,
    pub trajectory: TrajectoryFigure,
}

impl RunRecord {
    fn key(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.env_name)
    }

    /// Scalar metrics in the `<env>/<metric>` shape trackers expect.
    pub fn scalars(&self) -> Vec<(String, f64)> {
        let metrics = &self.metrics;
        vec![
            (self.key(FINAL_REWARD), metrics.reward),
            (self.key(FINAL_SHARPE_RATIO), metrics.sharpe_ratio),
            (self.key(FINAL_ANNUAL_RETURN), metrics.annual_return),
            (self.key(FINAL_ANNUAL_VOLATILITY), metrics.annual_volatility),
            (self.key(FINAL_MAX_DRAWDOWN), metrics.max_drawdown),
        ]
    }

    pub fn figure_key(&self) -> String {
        self.key(TRAJECTORY_FIGURE)
    }
}

/// Destination of a finished run. `log` must commit before returning.
pub trait TrackingSink {
    fn log(&mut self, record: &RunRecord) -> Result<(), TrackingError>;
}

impl<S: TrackingSink + ?Sized> TrackingSink for Box<S> {
    fn log(&mut self, record: &RunRecord) -> Result<(), TrackingError> {
        (**self).log(record)
    }
}
