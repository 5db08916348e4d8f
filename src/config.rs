use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Serialize;

use crate::constants::env::SERIAL_SELECTION_POLICY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingBackend {
    /// Weights & Biases, through the Python bridge
    Wandb,
    /// Files under the tracking directory
    Local,
}

/// Run configuration. Built once from the command line and passed down by
/// reference; nothing mutates it after parsing.
#[derive(Parser, Debug, Clone, Serialize)]
#[command(name = "cointegration_rein")]
#[command(about = "Train and evaluate a pair trading policy on one rolling window", long_about = None)]
pub struct Config {
    #[arg(long, default_value = "log")]
    pub log_dir: String,

    #[arg(long, default_value = "saved_model")]
    pub saved_model_dir: String,

    /// Directory holding the per-window train/valid/test files
    #[arg(long, default_value = "trials/data/")]
    pub rolling_dataset_path: PathBuf,

    #[arg(long, default_value = SERIAL_SELECTION_POLICY)]
    pub policy: String,

    #[arg(long, default_value = "mlp")]
    pub feature_extractor: String,

    #[arg(long, default_value = "lstm")]
    pub trading_feature_extractor: String,

    #[arg(long, default_value_t = false)]
    pub asset_attention: bool,

    /// Which rolling window to train on
    #[arg(long, default_value_t = 1)]
    pub rolling_serial: usize,

    #[arg(long, default_value_t = 60)]
    pub asset_num: usize,

    #[arg(long, default_value_t = 3)]
    pub feature_dim: usize,

    #[arg(long, default_value_t = 64)]
    pub feature_extractor_hidden_dim: usize,

    #[arg(long, default_value_t = 1)]
    pub feature_extractor_num_layers: usize,

    #[arg(long, default_value_t = 2)]
    pub feature_extractor_num_heads: usize,

    #[arg(long, default_value_t = 64)]
    pub policy_network_hidden_dim: usize,

    #[arg(long, default_value_t = 13)]
    pub seed: u64,

    /// Steps before stopping a run for poor performance
    #[arg(long, default_value_t = 0)]
    pub patience_steps: usize,

    #[arg(long, default_value_t = 32)]
    pub eval_freq: usize,

    #[arg(long, default_value_t = 10_000)]
    pub train_steps: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    #[arg(long, default_value_t = 1.0)]
    pub rl_gamma: f64,

    #[arg(long, default_value_t = 1e-4)]
    pub ent_coef: f64,

    #[arg(long, default_value_t = 1)]
    pub num_process: usize,

    #[arg(long, default_value = "learning_to_pair")]
    pub project: String,

    #[arg(long, default_value = "jimin")]
    pub entity: String,

    /// Internal training iterations run by the single training step
    #[arg(long, default_value_t = 1_000)]
    pub trading_train_steps: usize,

    #[arg(long, default_value_t = 3)]
    pub trading_feature_extractor_feature_dim: usize,

    #[arg(long, default_value_t = 1)]
    pub trading_feature_extractor_num_layers: usize,

    #[arg(long, default_value_t = 64)]
    pub trading_feature_extractor_hidden_dim: usize,

    #[arg(long, default_value_t = 0.5)]
    pub trading_dropout: f64,

    #[arg(long, default_value_t = 2)]
    pub trading_feature_extractor_num_heads: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub trading_learning_rate: f64,

    #[arg(long, default_value = "trading_log")]
    pub trading_log_dir: String,

    #[arg(long, default_value_t = 1.0)]
    pub trading_rl_gamma: f64,

    #[arg(long, default_value_t = 1e-4)]
    pub trading_ent_coef: f64,

    #[arg(long, default_value_t = 2)]
    pub trading_num_process: usize,

    /// CSV with a `pairs` column, one pair per rolling window
    #[arg(long, default_value = "trials/scripts/script/coin_pairs.csv")]
    pub selected_symbol_path: PathBuf,

    #[arg(long, value_enum, default_value_t = TrackingBackend::Wandb)]
    pub tracking: TrackingBackend,

    /// Run directory for the tracking backend
    #[arg(long, default_value = "wandb")]
    pub tracking_dir: PathBuf,
}

impl Config {
    pub fn serial_selection(&self) -> bool {
        self.policy == SERIAL_SELECTION_POLICY
    }

    /// The configuration as a flat JSON object, the shape experiment trackers expect.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from(["cointegration_rein"])
    }
}
