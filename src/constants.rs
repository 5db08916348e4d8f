pub mod files {
    pub const DATASET_EXTENSION: &str = "csv";
    pub const METRICS_FILE: &str = "metrics.jsonl";
    pub const CONFIG_FILE: &str = "config.json";
    pub const TRAJECTORY_REPORT_FILE: &str = "trajectory.report.bin";
    pub const TRAJECTORY_IMAGE_FILE: &str = "trajectory.png";
}

pub mod columns {
    pub const DATE: &str = "date";
    pub const PERIOD: &str = "period";
    pub const SYMBOL: &str = "symbol";
    pub const CLOSE: &str = "close";
    pub const PAIRS: &str = "pairs";

    pub const FORMATION: &str = "formation";
    pub const TRADING: &str = "trading";
}

pub mod env {
    pub const TRAIN_NAME: &str = "train";
    pub const TEST_NAME: &str = "test";
    /// Policy name that switches the environment to serial pair selection.
    pub const SERIAL_SELECTION_POLICY: &str = "simple_serial_selection";
}

/// Suffixes appended to the environment name when the run is recorded.
pub mod metrics {
    pub const FINAL_REWARD: &str = "final_reward";
    pub const FINAL_SHARPE_RATIO: &str = "final_sharpe_ratio";
    pub const FINAL_ANNUAL_RETURN: &str = "final_annual_return";
    pub const FINAL_ANNUAL_VOLATILITY: &str = "final_annual_volatility";
    pub const FINAL_MAX_DRAWDOWN: &str = "final_max_drawdown";
    pub const TRAJECTORY_FIGURE: &str = "trajectory_figure";
}

pub mod charts {
    pub const TRAJECTORY_DIMS: (u32, u32) = (1600, 1200);
}
