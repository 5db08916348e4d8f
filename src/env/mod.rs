//! Seams for the trading environment and the policy it trains.
//!
//! The environment owns the reward, the risk metrics and the policy training
//! loop. This crate only constructs environments, drives them and reads their
//! step outcomes.

#[cfg(feature = "python")]
pub mod python;

use chrono::NaiveDateTime;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    charts::TrajectoryFigure, config::Config, data::SplitDataset, error::EnvError,
    types::PairAction,
};

/// Auxiliary info returned by a step over a whole trading trajectory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    /// Position taken at every trading step
    pub actions: Vec<f64>,
    /// Return realized at every trading step
    pub returns: Vec<f64>,
    pub sharpe_ratio: f64,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Everything an environment is constructed from.
pub struct EnvArgs<'a, P> {
    pub name: &'a str,
    pub asset_names: &'a [String],
    pub dataset: &'a SplitDataset,
    pub config: &'a Config,
    pub serial_selection: bool,
    /// Training iterations run inside a single step; zero for evaluation
    pub trading_train_steps: usize,
    /// Trained policy to reuse instead of creating a new one
    pub model: Option<P>,
    pub rng: StdRng,
}

pub trait TradingEnv {
    /// Handle to the policy the environment trains and acts with.
    type Policy;

    fn name(&self) -> &str;

    fn asset_num(&self) -> usize;

    fn reset(&mut self) -> Result<(), EnvError>;

    /// One coarse step: trains over `trading_train_steps` iterations (if any)
    /// and trades the whole trading period with the selected pair.
    fn step(&mut self, action: PairAction) -> Result<StepOutcome, EnvError>;

    fn is_eval(&self) -> bool;

    fn set_eval(&mut self, is_eval: bool) -> Result<(), EnvError>;

    /// The policy currently held by the environment.
    fn policy(&self) -> Result<Self::Policy, EnvError>;

    /// Asset indices the action selects.
    fn map_action(&self, action: PairAction) -> Result<(usize, usize), EnvError> {
        let assets = self.asset_num();
        if action.x >= assets || action.y >= assets {
            return Err(EnvError::ActionOutOfRange {
                action: action.to_string(),
                assets,
            });
        }
        Ok((action.x, action.y))
    }

    /// Trajectory of the traded pair. Backends that draw their own figure
    /// attach it as `image`.
    #[allow(clippy::too_many_arguments)]
    fn plot_trajectory(
        &self,
        dates: &[NaiveDateTime],
        asset_names: [&str; 2],
        x_log_prices: &[f64],
        y_log_prices: &[f64],
        actions: &[f64],
        returns: &[f64],
    ) -> Result<TrajectoryFigure, EnvError> {
        Ok(TrajectoryFigure {
            env_name: self.name().to_string(),
            dates: dates.to_vec(),
            asset_names: asset_names.map(String::from),
            x_log_prices: x_log_prices.to_vec(),
            y_log_prices: y_log_prices.to_vec(),
            actions: actions.to_vec(),
            returns: returns.to_vec(),
            image: None,
        })
    }
}

/// Builds environments and owns the random state of whatever runs them.
pub trait EnvBackend {
    type Env: TradingEnv;

    /// Seeds every random source of the backend and fixes its thread count.
    fn seed(&mut self, seed: u64, num_threads: usize) -> Result<(), EnvError>;

    fn build(
        &mut self,
        args: EnvArgs<'_, <Self::Env as TradingEnv>::Policy>,
    ) -> Result<Self::Env, EnvError>;
}

/// Random source handed to the environment called `name`, derived from the
/// run seed so that every environment is reproducible on its own.
pub fn env_rng(seed: u64, name: &str) -> StdRng {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    StdRng::seed_from_u64(seed ^ hash)
}
