//! One experiment run: train a policy on the train split with the selected
//! pair, evaluate it once on the test split and record the outcome.
use tracing::info;

use crate::{
    config::Config,
    constants::env::{TEST_NAME, TRAIN_NAME},
    data::{load_rolling_window, Dataset},
    env::{env_rng, EnvArgs, EnvBackend, StepOutcome, TradingEnv},
    error::{EnvError, RunError},
    pairs::{load_pairs, resolve_action},
    tracking::{FinalMetrics, RunRecord, TrackingSink},
    types::PairAction,
};

/// Datasets and action of a run, resolved before any environment exists.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub dataset: Dataset,
    pub action: PairAction,
}

/// Seeds the backend, then loads the rolling window and resolves the action.
///
/// Every failure here is fatal and happens before an environment or a
/// tracking sink is touched.
pub fn prepare<B: EnvBackend>(config: &Config, backend: &mut B) -> Result<PreparedRun, RunError> {
    backend.seed(config.seed, config.num_process)?;

    info!(rolling_serial = config.rolling_serial, "start training");
    let pairs = load_pairs(&config.selected_symbol_path)?;
    let dataset = load_rolling_window(
        &config.rolling_dataset_path,
        config.rolling_serial,
        config.asset_num,
        config.feature_dim,
    )?;
    let action = resolve_action(&pairs, config.rolling_serial, &dataset.asset_names)?;

    Ok(PreparedRun { dataset, action })
}

/// Trains on the train split, evaluates on the test split and flushes the
/// result to `sink`. Environment errors are not retried.
pub fn execute<B, S>(
    config: &Config,
    prepared: &PreparedRun,
    backend: &mut B,
    sink: &mut S,
) -> Result<RunRecord, RunError>
where
    B: EnvBackend,
    S: TrackingSink + ?Sized,
{
    let PreparedRun { dataset, action } = prepared;
    let action = *action;

    let mut train_env = backend.build(EnvArgs {
        name: TRAIN_NAME,
        asset_names: &dataset.asset_names,
        dataset: &dataset.train,
        config,
        serial_selection: config.serial_selection(),
        trading_train_steps: config.trading_train_steps,
        model: None,
        rng: env_rng(config.seed, TRAIN_NAME),
    })?;
    train_env.reset()?;
    let train = train_env.step(action)?;
    info!(
        env = train_env.name(),
        reward = train.reward,
        sharpe_ratio = train.info.sharpe_ratio,
        "training step finished"
    );

    let model = train_env.policy()?;
    let mut test_env = backend.build(EnvArgs {
        name: TEST_NAME,
        asset_names: &dataset.asset_names,
        dataset: &dataset.test,
        config,
        serial_selection: config.serial_selection(),
        trading_train_steps: 0,
        model: Some(model),
        rng: env_rng(config.seed, TEST_NAME),
    })?;
    test_env.reset()?;
    let test = evaluate(&mut test_env, action)?;

    let (x_index, y_index) = test_env.map_action(action)?;
    let trading = &dataset.test.trading;
    let x_log_prices = trading.log_prices.row(x_index).to_vec();
    let y_log_prices = trading.log_prices.row(y_index).to_vec();
    let trajectory = test_env.plot_trajectory(
        &trading.dates,
        [
            dataset.asset_names[x_index].as_str(),
            dataset.asset_names[y_index].as_str(),
        ],
        &x_log_prices,
        &y_log_prices,
        &test.info.actions,
        &test.info.returns,
    )?;

    let record = RunRecord {
        env_name: test_env.name().to_string(),
        metrics: FinalMetrics::from(&test),
        trajectory,
    };
    info!(
        env = %record.env_name,
        reward = record.metrics.reward,
        sharpe_ratio = record.metrics.sharpe_ratio,
        annual_return = record.metrics.annual_return,
        annual_volatility = record.metrics.annual_volatility,
        max_drawdown = record.metrics.max_drawdown,
        "evaluation finished"
    );

    sink.log(&record)?;
    Ok(record)
}

/// Steps `env` once in evaluation mode. The flag is cleared again whether or
/// not the step succeeds; a step error wins over a clearing error.
fn evaluate<E: TradingEnv>(env: &mut E, action: PairAction) -> Result<StepOutcome, EnvError> {
    env.set_eval(true)?;
    let outcome = env.step(action);
    let cleared = env.set_eval(false);
    let outcome = outcome?;
    cleared?;
    Ok(outcome)
}

/// `prepare` followed by `execute`.
pub fn run<B, S>(config: &Config, backend: &mut B, sink: &mut S) -> Result<RunRecord, RunError>
where
    B: EnvBackend,
    S: TrackingSink + ?Sized,
{
    let prepared = prepare(config, backend)?;
    execute(config, &prepared, backend, sink)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, path::Path, rc::Rc, sync::Arc};

    use rand::{rngs::StdRng, Rng};

    use super::*;
    use crate::{
        data::dataset::tests::write_frame, error::TrackingError, types::Split,
    };

    #[derive(Debug)]
    struct Model {
        trained_steps: usize,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Seed(u64, usize),
        Build {
            name: String,
            train_steps: usize,
            has_model: bool,
        },
        Reset(String),
        Step {
            name: String,
            action: PairAction,
            is_eval: bool,
        },
    }

    type Calls = Rc<RefCell<Vec<Call>>>;

    struct FakeEnv {
        name: String,
        asset_num: usize,
        model: Arc<Model>,
        rng: StdRng,
        is_eval: bool,
        fail_step: bool,
        fail_clear: bool,
        calls: Calls,
    }

    impl TradingEnv for FakeEnv {
        type Policy = Arc<Model>;

        fn name(&self) -> &str {
            &self.name
        }

        fn asset_num(&self) -> usize {
            self.asset_num
        }

        fn reset(&mut self) -> Result<(), EnvError> {
            self.calls.borrow_mut().push(Call::Reset(self.name.clone()));
            Ok(())
        }

        fn step(&mut self, action: PairAction) -> Result<StepOutcome, EnvError> {
            self.calls.borrow_mut().push(Call::Step {
                name: self.name.clone(),
                action,
                is_eval: self.is_eval,
            });
            if self.fail_step {
                return Err(EnvError::Backend("diverged".to_string()));
            }

            let returns: Vec<f64> = (0..4).map(|_| self.rng.gen_range(-0.01..0.01)).collect();
            Ok(StepOutcome {
                reward: returns.iter().sum(),
                done: true,
                info: crate::env::StepInfo {
                    actions: vec![1.0, 0.0, -1.0, 0.0],
                    sharpe_ratio: self.rng.gen(),
                    annual_return: self.rng.gen(),
                    annual_volatility: self.rng.gen(),
                    max_drawdown: -self.rng.gen::<f64>(),
                    returns,
                },
            })
        }

        fn is_eval(&self) -> bool {
            self.is_eval
        }

        fn set_eval(&mut self, is_eval: bool) -> Result<(), EnvError> {
            if !is_eval && self.fail_clear {
                return Err(EnvError::Backend("eval flag stuck".to_string()));
            }
            self.is_eval = is_eval;
            Ok(())
        }

        fn policy(&self) -> Result<Arc<Model>, EnvError> {
            Ok(Arc::clone(&self.model))
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        calls: Calls,
        fail_test_step: bool,
        built: Vec<Arc<Model>>,
    }

    impl EnvBackend for FakeBackend {
        type Env = FakeEnv;

        fn seed(&mut self, seed: u64, num_threads: usize) -> Result<(), EnvError> {
            self.calls.borrow_mut().push(Call::Seed(seed, num_threads));
            Ok(())
        }

        fn build(&mut self, args: EnvArgs<'_, Arc<Model>>) -> Result<FakeEnv, EnvError> {
            self.calls.borrow_mut().push(Call::Build {
                name: args.name.to_string(),
                train_steps: args.trading_train_steps,
                has_model: args.model.is_some(),
            });
            let model = args.model.unwrap_or_else(|| {
                Arc::new(Model {
                    trained_steps: args.trading_train_steps,
                })
            });
            self.built.push(Arc::clone(&model));

            Ok(FakeEnv {
                name: args.name.to_string(),
                asset_num: args.asset_names.len(),
                model,
                rng: args.rng,
                is_eval: false,
                fail_step: self.fail_test_step && args.name == TEST_NAME,
                fail_clear: false,
                calls: Rc::clone(&self.calls),
            })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        records: Vec<RunRecord>,
    }

    impl TrackingSink for MemorySink {
        fn log(&mut self, record: &RunRecord) -> Result<(), TrackingError> {
            self.records.push(record.clone());
            Ok(())
        }
    }

    const SYMBOLS: [&str; 4] = ["AAA", "BBB", "CCC", "DDD"];

    fn write_inputs(dir: &Path, windows: usize) -> Config {
        let data_dir = dir.join("data");
        std::fs::create_dir(&data_dir).unwrap();
        for window in 0..windows {
            for split in Split::ALL {
                write_frame(
                    &data_dir.join(format!("rolling_{window}_{split}.csv")),
                    &SYMBOLS,
                    3,
                    6,
                    4,
                );
            }
        }
        let pairs = dir.join("coin_pairs.csv");
        std::fs::write(&pairs, "pairs\nwindow_0_CCC-AAA\nwindow_1_BBB-DDD\n").unwrap();

        Config {
            rolling_dataset_path: data_dir,
            selected_symbol_path: pairs,
            asset_num: SYMBOLS.len(),
            rolling_serial: 0,
            ..Config::default()
        }
    }

    #[test]
    fn runs_one_training_and_one_evaluation_step() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_inputs(dir.path(), 2);
        let mut backend = FakeBackend::default();
        let mut sink = MemorySink::default();

        let record = run(&config, &mut backend, &mut sink).unwrap();

        let action = PairAction::new(2, 0);
        assert_eq!(
            *backend.calls.borrow(),
            vec![
                Call::Seed(13, 1),
                Call::Build {
                    name: "train".to_string(),
                    train_steps: 1_000,
                    has_model: false
                },
                Call::Reset("train".to_string()),
                Call::Step {
                    name: "train".to_string(),
                    action,
                    is_eval: false
                },
                Call::Build {
                    name: "test".to_string(),
                    train_steps: 0,
                    has_model: true
                },
                Call::Reset("test".to_string()),
                Call::Step {
                    name: "test".to_string(),
                    action,
                    is_eval: true
                },
            ]
        );
        assert_eq!(sink.records, vec![record.clone()]);
        assert_eq!(record.env_name, "test");
        assert_eq!(record.trajectory.asset_names, ["CCC", "AAA"]);
        assert_eq!(record.trajectory.dates.len(), 4);
        assert_eq!(record.trajectory.actions, vec![1.0, 0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_env_reuses_the_trained_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_inputs(dir.path(), 1);
        let mut backend = FakeBackend::default();

        run(&config, &mut backend, &mut MemorySink::default()).unwrap();

        assert_eq!(backend.built.len(), 2);
        assert!(Arc::ptr_eq(&backend.built[0], &backend.built[1]));
        assert_eq!(backend.built[1].trained_steps, config.trading_train_steps);
    }

    #[test]
    fn trajectory_uses_the_selected_assets_trading_prices() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            rolling_serial: 1,
            ..write_inputs(dir.path(), 2)
        };
        let mut backend = FakeBackend::default();
        let mut sink = MemorySink::default();

        let prepared = prepare(&config, &mut backend).unwrap();
        let record = execute(&config, &prepared, &mut backend, &mut sink).unwrap();

        assert_eq!(prepared.action, PairAction::new(1, 3));
        let trading = &prepared.dataset.test.trading;
        assert_eq!(record.trajectory.x_log_prices, trading.log_prices.row(1).to_vec());
        assert_eq!(record.trajectory.y_log_prices, trading.log_prices.row(3).to_vec());
        assert_eq!(record.trajectory.dates, trading.dates);
    }

    #[test]
    fn same_seed_gives_identical_records() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_inputs(dir.path(), 1);

        let first = run(&config, &mut FakeBackend::default(), &mut MemorySink::default()).unwrap();
        let second = run(&config, &mut FakeBackend::default(), &mut MemorySink::default()).unwrap();
        let reseeded = run(
            &Config {
                seed: 14,
                ..config.clone()
            },
            &mut FakeBackend::default(),
            &mut MemorySink::default(),
        )
        .unwrap();

        assert_eq!(first, second);
        assert_ne!(first.metrics, reseeded.metrics);
    }

    #[test]
    fn eval_flag_is_cleared_after_evaluation() {
        let calls = Calls::default();
        let mut env = FakeEnv {
            name: "test".to_string(),
            asset_num: 2,
            model: Arc::new(Model { trained_steps: 0 }),
            rng: env_rng(13, "test"),
            is_eval: false,
            fail_step: false,
            fail_clear: false,
            calls: Rc::clone(&calls),
        };

        assert!(!env.is_eval());
        evaluate(&mut env, PairAction::new(0, 1)).unwrap();
        assert!(!env.is_eval());
        assert!(matches!(
            calls.borrow().last(),
            Some(Call::Step { is_eval: true, .. })
        ));

        env.fail_step = true;
        assert!(evaluate(&mut env, PairAction::new(0, 1)).is_err());
        assert!(!env.is_eval());
    }

    #[test]
    fn step_error_wins_over_clearing_error() {
        let mut env = FakeEnv {
            name: "test".to_string(),
            asset_num: 2,
            model: Arc::new(Model { trained_steps: 0 }),
            rng: env_rng(13, "test"),
            is_eval: false,
            fail_step: true,
            fail_clear: true,
            calls: Calls::default(),
        };

        match evaluate(&mut env, PairAction::new(0, 1)) {
            Err(EnvError::Backend(message)) => assert_eq!(message, "diverged"),
            other => panic!("unexpected result: {other:?}"),
        }

        env.fail_step = false;
        match evaluate(&mut env, PairAction::new(0, 1)) {
            Err(EnvError::Backend(message)) => assert_eq!(message, "eval flag stuck"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn failing_evaluation_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_inputs(dir.path(), 1);
        let mut backend = FakeBackend {
            fail_test_step: true,
            ..FakeBackend::default()
        };
        let mut sink = MemorySink::default();

        let err = run(&config, &mut backend, &mut sink).unwrap_err();

        assert!(matches!(err, RunError::Env(EnvError::Backend(_))));
        assert!(sink.records.is_empty());
    }

    #[test]
    fn preparation_failures_build_no_environment() {
        let dir = tempfile::tempdir().unwrap();

        let out_of_range = Config {
            rolling_serial: 1,
            ..write_inputs(dir.path(), 1)
        };
        let mut backend = FakeBackend::default();
        let err = run(&out_of_range, &mut backend, &mut MemorySink::default()).unwrap_err();
        assert!(matches!(
            err,
            RunError::Dataset(crate::error::DatasetError::RollingSerialOutOfRange { .. })
        ));
        assert_eq!(*backend.calls.borrow(), vec![Call::Seed(13, 1)]);

        std::fs::write(
            &out_of_range.selected_symbol_path,
            "pairs\nwindow_0_CCC-ZZZ\n",
        )
        .unwrap();
        let unknown = Config {
            rolling_serial: 0,
            ..out_of_range
        };
        let mut backend = FakeBackend::default();
        let err = run(&unknown, &mut backend, &mut MemorySink::default()).unwrap_err();
        assert!(matches!(
            err,
            RunError::Pair(crate::error::PairError::UnknownSymbol(_))
        ));
        assert!(backend.built.is_empty());
    }
}
