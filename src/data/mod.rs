pub mod dataset;
pub mod rolling;

use std::path::Path;

use tracing::info;

pub use dataset::{build_dataset, load_data, log_dataset, Dataset, PeriodData, SplitDataset};
pub use rolling::{select_file_names, RollingFiles};

use crate::{error::DatasetError, types::Split};

/// Loads the train/valid/test files of rolling window `serial` from `dir`.
///
/// The serial is checked against the discovered windows before any dataset
/// file is opened.
pub fn load_rolling_window(
    dir: &Path,
    serial: usize,
    asset_num: usize,
    feature_dim: usize,
) -> Result<Dataset, DatasetError> {
    info!(dir = %dir.display(), "load data");
    let files = RollingFiles::discover(dir)?;
    let paths = files.select(serial)?;

    let train = load_data(&paths[Split::Train])?;
    let valid = load_data(&paths[Split::Valid])?;
    let test = load_data(&paths[Split::Test])?;

    let dataset = build_dataset(&train, &valid, &test, asset_num, feature_dim)?;
    for split in Split::ALL {
        log_dataset(split, dataset.split(split));
    }

    Ok(dataset)
}
