//! Bridge to the Python trading environment.
//!
//! `ReinforceTradingEnv` is wrapped in a stable-baselines3 `Monitor` exactly as
//! the training scripts do; the policy it trains stays a Python object and is
//! handed between environments as an opaque handle.
use chrono::NaiveDateTime;
use ndarray::{Array2, Array3};
use pyo3::exceptions::PyKeyError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict};
use tracing::debug;

use super::{EnvArgs, EnvBackend, StepInfo, StepOutcome, TradingEnv};
use crate::{charts::TrajectoryFigure, data::PeriodData, error::EnvError, types::PairAction};

const ENV_MODULE: &str = "env";
const ENV_CLASS: &str = "ReinforceTradingEnv";
const MONITOR_MODULE: &str = "stable_baselines3.common.monitor";
const SB3_UTILS_MODULE: &str = "stable_baselines3.common.utils";

fn py_err(err: PyErr) -> EnvError {
    EnvError::Backend(err.to_string())
}

fn array3<'py>(np: &Bound<'py, PyModule>, array: &Array3<f64>) -> PyResult<Bound<'py, PyAny>> {
    let flat: Vec<f64> = array.iter().copied().collect();
    np.call_method1("asarray", (flat,))?
        .call_method1("reshape", (array.dim(),))
}

fn array2<'py>(np: &Bound<'py, PyModule>, array: &Array2<f64>) -> PyResult<Bound<'py, PyAny>> {
    let flat: Vec<f64> = array.iter().copied().collect();
    np.call_method1("asarray", (flat,))?
        .call_method1("reshape", (array.dim(),))
}

fn dates<'py>(pd: &Bound<'py, PyModule>, period: &PeriodData) -> PyResult<Bound<'py, PyAny>> {
    let dates: Vec<String> = period.dates.iter().map(|d| d.to_string()).collect();
    pd.call_method1("to_datetime", (dates,))
}

/// Flattens any array-like into floats.
fn float_vec(value: &Bound<'_, PyAny>) -> PyResult<Vec<f64>> {
    if let Ok(values) = value.extract::<Vec<f64>>() {
        return Ok(values);
    }

    let np = value.py().import_bound("numpy")?;
    let kwargs = PyDict::new_bound(value.py());
    kwargs.set_item("dtype", "float64")?;
    np.call_method("asarray", (value,), Some(&kwargs))?
        .call_method0("ravel")?
        .call_method0("tolist")?
        .extract()
}

/// Encodes whatever the environment plotted as PNG: a matplotlib figure is
/// saved (and closed), anything else is taken as an image array.
fn figure_png(figure: &Bound<'_, PyAny>) -> PyResult<Vec<u8>> {
    let py = figure.py();
    let buffer = py.import_bound("io")?.call_method0("BytesIO")?;

    if figure.hasattr("savefig")? {
        let kwargs = PyDict::new_bound(py);
        kwargs.set_item("format", "png")?;
        figure.call_method("savefig", (&buffer,), Some(&kwargs))?;
        // Best effort: only matplotlib figures are registered with pyplot
        if let Ok(pyplot) = py.import_bound("matplotlib.pyplot") {
            let _ = pyplot.call_method1("close", (figure,));
        }
    } else {
        let pixels = py
            .import_bound("numpy")?
            .call_method1("asarray", (figure, "uint8"))?;
        py.import_bound("PIL.Image")?
            .call_method1("fromarray", (pixels,))?
            .call_method1("save", (&buffer, "PNG"))?;
    }

    let png = buffer.call_method0("getvalue")?.downcast_into::<PyBytes>()?;
    Ok(png.as_bytes().to_vec())
}

fn info_item<'py>(info: &Bound<'py, PyAny>, key: &str) -> PyResult<Option<Bound<'py, PyAny>>> {
    match info.get_item(key) {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_instance_of::<PyKeyError>(info.py()) => Ok(None),
        Err(err) => Err(err),
    }
}

#[derive(Debug, Default)]
pub struct PyBackend;

impl EnvBackend for PyBackend {
    type Env = PyTradingEnv;

    fn seed(&mut self, seed: u64, num_threads: usize) -> Result<(), EnvError> {
        Python::with_gil(|py| -> PyResult<()> {
            let kwargs = PyDict::new_bound(py);
            kwargs.set_item("using_cuda", true)?;
            py.import_bound(SB3_UTILS_MODULE)?
                .call_method("set_random_seed", (seed,), Some(&kwargs))?;
            py.import_bound("torch")?
                .call_method1("set_num_threads", (num_threads,))?;
            Ok(())
        })
        .map_err(py_err)
    }

    fn build(&mut self, args: EnvArgs<'_, Py<PyAny>>) -> Result<PyTradingEnv, EnvError> {
        let config = args.config;
        let dataset = args.dataset;

        let env = Python::with_gil(|py| -> PyResult<Py<PyAny>> {
            let np = py.import_bound("numpy")?;
            let pd = py.import_bound("pandas")?;

            let kwargs = PyDict::new_bound(py);
            kwargs.set_item("name", args.name)?;
            kwargs.set_item("form_date", dates(&pd, &dataset.formation)?)?;
            kwargs.set_item("trad_date", dates(&pd, &dataset.trading)?)?;
            kwargs.set_item("asset_name", args.asset_names.to_vec())?;
            kwargs.set_item("form_asset_features", array3(&np, &dataset.formation.features)?)?;
            kwargs.set_item("form_asset_log_prices", array2(&np, &dataset.formation.log_prices)?)?;
            kwargs.set_item("trad_asset_features", array3(&np, &dataset.trading.features)?)?;
            kwargs.set_item("trad_asset_log_prices", array2(&np, &dataset.trading.log_prices)?)?;
            kwargs.set_item("feature_dim", config.feature_dim)?;
            kwargs.set_item("serial_selection", args.serial_selection)?;
            kwargs.set_item("asset_attention", config.asset_attention)?;
            kwargs.set_item("num_process", config.num_process)?;
            kwargs.set_item("trading_feature_extractor", &config.trading_feature_extractor)?;
            kwargs.set_item(
                "trading_feature_extractor_feature_dim",
                config.trading_feature_extractor_feature_dim,
            )?;
            kwargs.set_item(
                "trading_feature_extractor_num_layers",
                config.trading_feature_extractor_num_layers,
            )?;
            kwargs.set_item(
                "trading_feature_extractor_hidden_dim",
                config.trading_feature_extractor_hidden_dim,
            )?;
            kwargs.set_item(
                "trading_feature_extractor_num_heads",
                config.trading_feature_extractor_num_heads,
            )?;
            kwargs.set_item("trading_train_steps", args.trading_train_steps)?;
            kwargs.set_item("trading_num_process", config.trading_num_process)?;
            kwargs.set_item("trading_dropout", config.trading_dropout)?;
            kwargs.set_item("policy", &config.policy)?;
            kwargs.set_item("trading_learning_rate", config.trading_learning_rate)?;
            kwargs.set_item("trading_log_dir", &config.trading_log_dir)?;
            kwargs.set_item("trading_rl_gamma", config.trading_rl_gamma)?;
            kwargs.set_item("trading_ent_coef", config.trading_ent_coef)?;
            kwargs.set_item("seed", config.seed)?;
            kwargs.set_item("model", args.model)?;

            let inner = py
                .import_bound(ENV_MODULE)?
                .getattr(ENV_CLASS)?
                .call((), Some(&kwargs))?;
            let monitor = py
                .import_bound(MONITOR_MODULE)?
                .getattr("Monitor")?
                .call1((inner,))?;
            Ok(monitor.unbind())
        })
        .map_err(py_err)?;

        debug!(name = args.name, "python environment constructed");
        Ok(PyTradingEnv {
            env,
            name: args.name.to_string(),
            asset_num: args.asset_names.len(),
            is_eval: false,
        })
    }
}

pub struct PyTradingEnv {
    env: Py<PyAny>,
    name: String,
    asset_num: usize,
    is_eval: bool,
}

impl PyTradingEnv {
    fn with_unwrapped<T>(
        &self,
        f: impl for<'py> FnOnce(Bound<'py, PyAny>) -> PyResult<T>,
    ) -> Result<T, EnvError> {
        Python::with_gil(|py| f(self.env.bind(py).getattr("unwrapped")?)).map_err(py_err)
    }
}

impl TradingEnv for PyTradingEnv {
    type Policy = Py<PyAny>;

    fn name(&self) -> &str {
        &self.name
    }

    fn asset_num(&self) -> usize {
        self.asset_num
    }

    fn reset(&mut self) -> Result<(), EnvError> {
        Python::with_gil(|py| self.env.bind(py).call_method0("reset").map(|_| ())).map_err(py_err)
    }

    fn step(&mut self, action: PairAction) -> Result<StepOutcome, EnvError> {
        Python::with_gil(|py| -> PyResult<Result<StepOutcome, EnvError>> {
            let step = self
                .env
                .bind(py)
                .call_method1("step", ((action.x, action.y),))?;

            // (obs, reward, done, info) or (obs, reward, terminated, truncated, info)
            let len = step.len()?;
            let reward: f64 = step.get_item(1)?.extract()?;
            let mut done: bool = step.get_item(2)?.is_truthy()?;
            if len == 5 {
                done |= step.get_item(3)?.is_truthy()?;
            }
            let raw_info = step.get_item(len - 1)?;

            macro_rules! required {
                ($key:literal) => {
                    match info_item(&raw_info, $key)? {
                        Some(value) => value,
                        None => return Ok(Err(EnvError::MissingInfo($key))),
                    }
                };
            }

            let info = StepInfo {
                actions: float_vec(&required!("actions"))?,
                returns: float_vec(&required!("returns"))?,
                sharpe_ratio: required!("sharpe_ratio").extract()?,
                annual_return: required!("annual_return").extract()?,
                annual_volatility: required!("annual_volatility").extract()?,
                max_drawdown: required!("max_drawdown").extract()?,
            };
            Ok(Ok(StepOutcome { reward, done, info }))
        })
        .map_err(py_err)?
    }

    fn is_eval(&self) -> bool {
        self.is_eval
    }

    fn set_eval(&mut self, is_eval: bool) -> Result<(), EnvError> {
        self.with_unwrapped(|env| env.setattr("is_eval", is_eval))?;
        self.is_eval = is_eval;
        Ok(())
    }

    fn policy(&self) -> Result<Py<PyAny>, EnvError> {
        let model = self.with_unwrapped(|env| {
            let model = env.getattr("model")?;
            Ok((!model.is_none()).then(|| model.unbind()))
        })?;
        model.ok_or_else(|| EnvError::MissingPolicy {
            env: self.name.clone(),
        })
    }

    fn map_action(&self, action: PairAction) -> Result<(usize, usize), EnvError> {
        let indices: Vec<usize> = self.with_unwrapped(|env| {
            env.call_method1("get_map_action", ((action.x, action.y),))?
                .extract()
        })?;
        match indices.as_slice() {
            [x, y] if *x < self.asset_num && *y < self.asset_num => Ok((*x, *y)),
            _ => Err(EnvError::ActionOutOfRange {
                action: action.to_string(),
                assets: self.asset_num,
            }),
        }
    }

    /// Lets the environment draw the trajectory over its own trading dates and
    /// attaches the result as PNG.
    fn plot_trajectory(
        &self,
        dates: &[NaiveDateTime],
        asset_names: [&str; 2],
        x_log_prices: &[f64],
        y_log_prices: &[f64],
        actions: &[f64],
        returns: &[f64],
    ) -> Result<TrajectoryFigure, EnvError> {
        let image = self.with_unwrapped(|env| {
            let figure = env.call_method1(
                "plot_trajectory",
                (
                    env.getattr("trad_date")?,
                    asset_names.to_vec(),
                    x_log_prices.to_vec(),
                    y_log_prices.to_vec(),
                    actions.to_vec(),
                    returns.to_vec(),
                ),
            )?;
            figure_png(&figure)
        })?;

        Ok(TrajectoryFigure {
            env_name: self.name.clone(),
            dates: dates.to_vec(),
            asset_names: asset_names.map(String::from),
            x_log_prices: x_log_prices.to_vec(),
            y_log_prices: y_log_prices.to_vec(),
            actions: actions.to_vec(),
            returns: returns.to_vec(),
            image: Some(image),
        })
    }
}
