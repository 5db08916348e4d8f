use std::{fmt::Write as _, fs, path::Path};

use chrono::NaiveDateTime;
use learning_to_pair::{
    charts::TrajectoryFigure,
    config::Config,
    env::{EnvArgs, EnvBackend, StepInfo, StepOutcome, TradingEnv},
    error::{EnvError, TrackingError},
    experiment::run,
    tracking::{RunRecord, TrackingSink},
    types::{PairAction, Split},
};

const ASSETS: usize = 60;
const FEATURE_DIM: usize = 3;

fn symbols() -> Vec<String> {
    let mut symbols = vec!["AAA".to_string(), "BBB".to_string()];
    symbols.extend((0..ASSETS - 2).map(|i| format!("S{i:02}")));
    symbols
}

fn write_split(path: &Path, symbols: &[String]) {
    let mut out = String::from("date,period,symbol,close,volume,spread,momentum\n");
    for day in 1..=20 {
        let period = if day <= 12 { "formation" } else { "trading" };
        for (index, symbol) in symbols.iter().enumerate() {
            let close = 1.0 + index as f64 + day as f64 * 0.01;
            writeln!(
                out,
                "2022-01-{day:02},{period},{symbol},{close},{},{},{}",
                day * 10,
                0.001 * index as f64,
                day as f64 / 20.0
            )
            .unwrap();
        }
    }
    fs::write(path, out).unwrap();
}

struct ScriptedEnv {
    name: String,
    assets: usize,
    is_eval: bool,
}

impl TradingEnv for ScriptedEnv {
    type Policy = u32;

    fn name(&self) -> &str {
        &self.name
    }

    fn asset_num(&self) -> usize {
        self.assets
    }

    fn reset(&mut self) -> Result<(), EnvError> {
        Ok(())
    }

    fn step(&mut self, _action: PairAction) -> Result<StepOutcome, EnvError> {
        Ok(StepOutcome {
            reward: 0.25,
            done: true,
            info: StepInfo {
                actions: vec![1.0; 8],
                returns: vec![0.01; 8],
                sharpe_ratio: 1.5,
                annual_return: 0.3,
                annual_volatility: 0.2,
                max_drawdown: -0.1,
            },
        })
    }

    fn is_eval(&self) -> bool {
        self.is_eval
    }

    fn set_eval(&mut self, is_eval: bool) -> Result<(), EnvError> {
        self.is_eval = is_eval;
        Ok(())
    }

    fn policy(&self) -> Result<u32, EnvError> {
        Ok(7)
    }

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
            env_name: self.name.clone(),
            dates: dates.to_vec(),
            asset_names: asset_names.map(String::from),
            x_log_prices: x_log_prices.to_vec(),
            y_log_prices: y_log_prices.to_vec(),
            actions: actions.to_vec(),
            returns: returns.to_vec(),
            image: Some(format!("{} figure", self.name).into_bytes()),
        })
    }
}

#[derive(Default)]
struct ScriptedBackend {
    models: Vec<Option<u32>>,
    trading_days: Vec<usize>,
}

impl EnvBackend for ScriptedBackend {
    type Env = ScriptedEnv;

    fn seed(&mut self, _seed: u64, _num_threads: usize) -> Result<(), EnvError> {
        Ok(())
    }

    fn build(&mut self, args: EnvArgs<'_, u32>) -> Result<ScriptedEnv, EnvError> {
        self.models.push(args.model);
        self.trading_days.push(args.dataset.trading.dates.len());
        Ok(ScriptedEnv {
            name: args.name.to_string(),
            assets: args.asset_names.len(),
            is_eval: false,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    records: Vec<RunRecord>,
}

impl TrackingSink for RecordingSink {
    fn log(&mut self, record: &RunRecord) -> Result<(), TrackingError> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[test]
fn trains_and_evaluates_the_selected_pair() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    fs::create_dir(&data_dir).unwrap();
    let symbols = symbols();
    for split in Split::ALL {
        write_split(&data_dir.join(format!("rolling_0_{split}.csv")), &symbols);
    }
    let pairs = dir.path().join("coin_pairs.csv");
    fs::write(&pairs, "pairs\npair_0_AAA-BBB\n").unwrap();

    let config = Config {
        rolling_dataset_path: data_dir,
        selected_symbol_path: pairs,
        rolling_serial: 0,
        asset_num: ASSETS,
        feature_dim: FEATURE_DIM,
        ..Config::default()
    };
    let mut backend = ScriptedBackend::default();
    let mut sink = RecordingSink::default();

    let record = run(&config, &mut backend, &mut sink).unwrap();

    assert_eq!(record.trajectory.asset_names, ["AAA", "BBB"]);
    assert_eq!(backend.models, vec![None, Some(7)]);
    assert_eq!(backend.trading_days, vec![8, 8]);
    assert_eq!(sink.records.len(), 1);
    assert_eq!(
        sink.records[0].trajectory.image.as_deref(),
        Some(b"test figure".as_slice())
    );

    let keys: Vec<String> = record.scalars().into_iter().map(|(key, _)| key).collect();
    assert_eq!(
        keys,
        [
            "test/final_reward",
            "test/final_sharpe_ratio",
            "test/final_annual_return",
            "test/final_annual_volatility",
            "test/final_max_drawdown",
        ]
    );
    assert_eq!(record.figure_key(), "test/trajectory_figure");
    assert_eq!(record.metrics.sharpe_ratio, 1.5);
    assert_eq!(record.trajectory.x_log_prices.len(), 8);
    assert!((record.trajectory.x_log_prices[0] - (1.13f64).ln()).abs() < 1e-12);
}
