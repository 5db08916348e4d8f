use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use super::{RunRecord, TrackingSink};
use crate::{
    charts::TrajectoryFigure,
    config::Config,
    constants::files::{CONFIG_FILE, METRICS_FILE, TRAJECTORY_IMAGE_FILE, TRAJECTORY_REPORT_FILE},
    error::TrackingError,
    utils::create_folder_if_not_exists,
};

/// Records runs under `<root>/<run id>/`: the configuration, one JSON line of
/// metrics per logged record, the trajectory series and the rendered figure.
pub struct LocalSink {
    run_id: Uuid,
    run_dir: PathBuf,
}

impl LocalSink {
    pub fn create(root: &Path, config: &Config) -> Result<Self, TrackingError> {
        let run_id = Uuid::new_v4();
        let run_dir = root.join(run_id.to_string());
        create_folder_if_not_exists(&run_dir)?;

        let config = config
            .to_json()
            .map_err(|e| TrackingError::Encode(e.to_string()))?;
        fs::write(run_dir.join(CONFIG_FILE), config)?;

        info!(%run_id, dir = %run_dir.display(), "local tracking run created");
        Ok(Self { run_id, run_dir })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

impl TrackingSink for LocalSink {
    fn log(&mut self, record: &RunRecord) -> Result<(), TrackingError> {
        write_report(&self.run_dir.join(TRAJECTORY_REPORT_FILE), &record.trajectory)?;
        let image_path = self.run_dir.join(TRAJECTORY_IMAGE_FILE);
        match &record.trajectory.image {
            Some(png) => fs::write(&image_path, png)?,
            None => record
                .trajectory
                .render_png(&image_path)
                .map_err(|e| TrackingError::Render(e.to_string()))?,
        }
        write_metrics(&self.run_dir, record)?;

        info!(run_id = %self.run_id, "run logged");
        Ok(())
    }
}

/// Appends one JSON line with every scalar, plus the figure's file name under
/// the figure key, and syncs it to disk.
pub(crate) fn write_metrics(dir: &Path, record: &RunRecord) -> Result<(), TrackingError> {
    let mut line = Map::new();
    for (key, value) in record.scalars() {
        line.insert(key, Value::from(value));
    }
    line.insert(
        record.figure_key(),
        Value::from(TRAJECTORY_IMAGE_FILE.to_string()),
    );
    let mut line =
        serde_json::to_string(&line).map_err(|e| TrackingError::Encode(e.to_string()))?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(METRICS_FILE))?;
    file.write_all(line.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

pub(crate) fn write_report(path: &Path, figure: &TrajectoryFigure) -> Result<(), TrackingError> {
    let bytes = postcard::to_stdvec(figure).map_err(|e| TrackingError::Encode(e.to_string()))?;
    fs::write(path, bytes)?;
    Ok(())
}
