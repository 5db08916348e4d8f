//! Weights & Biases sink, driven through the Python `wandb` package.
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict};
use tracing::{info, warn};

use super::{RunRecord, TrackingSink};
use crate::{
    config::Config,
    error::{RunError, TrackingError},
};

fn py_err(err: PyErr) -> TrackingError {
    TrackingError::Backend(err.to_string())
}

/// Trajectory picture handed to `wandb.Image`.
enum Picture<'a> {
    /// Drawn by the environment
    Png(&'a [u8]),
    /// Rendered here, packed RGB
    Rgb(Vec<u8>),
}

pub struct WandbSink {
    wandb: Py<PyModule>,
    run: Py<PyAny>,
}

impl WandbSink {
    /// Starts a run carrying the whole configuration.
    pub fn init(config: &Config) -> Result<Self, TrackingError> {
        let config_json = config
            .to_json()
            .map_err(|e| TrackingError::Encode(e.to_string()))?;

        let sink = Python::with_gil(|py| -> PyResult<Self> {
            let wandb = py.import_bound("wandb")?;
            let run_config = py
                .import_bound("json")?
                .call_method1("loads", (config_json,))?;

            let kwargs = PyDict::new_bound(py);
            kwargs.set_item("config", run_config)?;
            kwargs.set_item("project", &config.project)?;
            kwargs.set_item("entity", &config.entity)?;
            kwargs.set_item("dir", config.tracking_dir.to_string_lossy().as_ref())?;
            kwargs.set_item("sync_tensorboard", false)?;
            kwargs.set_item("monitor_gym", false)?;
            let run = wandb.call_method("init", (), Some(&kwargs))?;

            Ok(Self {
                wandb: wandb.unbind(),
                run: run.unbind(),
            })
        })
        .map_err(py_err)?;

        info!(project = %config.project, entity = %config.entity, "wandb run initialized");
        Ok(sink)
    }

    pub fn finish(self, exit_code: i32) -> Result<(), TrackingError> {
        Python::with_gil(|py| -> PyResult<()> {
            let kwargs = PyDict::new_bound(py);
            kwargs.set_item("exit_code", exit_code)?;
            self.run
                .bind(py)
                .call_method("finish", (), Some(&kwargs))
                .map(|_| ())
        })
        .map_err(py_err)
    }

    /// Finishes the run according to `result`. A failed run is marked with a
    /// non-zero exit code and keeps its own error even if finishing fails.
    pub fn finish_with<T>(self, result: Result<T, RunError>) -> Result<T, RunError> {
        match result {
            Ok(value) => {
                self.finish(0)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(finish_err) = self.finish(1) {
                    warn!(error = %finish_err, "failed to finish wandb run");
                }
                Err(err)
            }
        }
    }
}

impl TrackingSink for WandbSink {
    fn log(&mut self, record: &RunRecord) -> Result<(), TrackingError> {
        let (width, height) = record.trajectory.dims();
        let picture = match &record.trajectory.image {
            Some(png) => Picture::Png(png),
            None => Picture::Rgb(
                record
                    .trajectory
                    .render_rgb()
                    .map_err(|e| TrackingError::Render(e.to_string()))?,
            ),
        };

        Python::with_gil(|py| -> PyResult<()> {
            let wandb = self.wandb.bind(py);

            let picture = match &picture {
                Picture::Png(png) => {
                    let stream = py
                        .import_bound("io")?
                        .call_method1("BytesIO", (PyBytes::new_bound(py, png),))?;
                    py.import_bound("PIL.Image")?
                        .call_method1("open", (stream,))?
                }
                Picture::Rgb(rgb) => py
                    .import_bound("numpy")?
                    .call_method1("frombuffer", (PyBytes::new_bound(py, rgb), "uint8"))?
                    .call_method1("reshape", ((height as usize, width as usize, 3usize),))?,
            };
            let image_kwargs = PyDict::new_bound(py);
            image_kwargs.set_item("caption", record.trajectory.title())?;
            let image = wandb.call_method("Image", (picture,), Some(&image_kwargs))?;

            let values = PyDict::new_bound(py);
            for (key, value) in record.scalars() {
                values.set_item(key, value)?;
            }
            values.set_item(record.figure_key(), image)?;

            let log_kwargs = PyDict::new_bound(py);
            log_kwargs.set_item("commit", true)?;
            wandb.call_method("log", (values,), Some(&log_kwargs))?;
            Ok(())
        })
        .map_err(py_err)?;

        info!(env = %record.env_name, "metrics committed to wandb");
        Ok(())
    }
}
