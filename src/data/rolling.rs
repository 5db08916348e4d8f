use std::{
    fs,
    path::{Path, PathBuf},
};

use enum_map::EnumMap;
use tracing::debug;

use crate::{constants::files::DATASET_EXTENSION, error::DatasetError, types::Split};

/// Dataset file names of every rolling window, per split, in window order.
#[derive(Debug, Clone)]
pub struct RollingFiles {
    dir: PathBuf,
    files: EnumMap<Split, Vec<String>>,
}

impl RollingFiles {
    /// Lists the dataset directory once for every split. No dataset file is opened.
    pub fn discover(dir: &Path) -> Result<Self, DatasetError> {
        let mut files = EnumMap::default();
        for split in Split::ALL {
            files[split] = select_file_names(dir, split)?;
            debug!(%split, windows = files[split].len(), "discovered rolling files");
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    pub fn windows(&self, split: Split) -> usize {
        self.files[split].len()
    }

    /// Paths of the train, valid and test files of one rolling window.
    pub fn select(&self, serial: usize) -> Result<EnumMap<Split, PathBuf>, DatasetError> {
        for split in Split::ALL {
            let available = self.windows(split);
            if serial >= available {
                return Err(DatasetError::RollingSerialOutOfRange {
                    serial,
                    available,
                    split,
                });
            }
        }

        Ok(EnumMap::from_fn(|split: Split| {
            self.dir.join(&self.files[split][serial])
        }))
    }
}

/// File names in `dir` tagged with `split`, sorted so that the rolling serial
/// indexes the same window on every run.
pub fn select_file_names(dir: &Path, split: Split) -> Result<Vec<String>, DatasetError> {
    let entries = fs::read_dir(dir).map_err(|source| DatasetError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DatasetError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some(DATASET_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if has_split_tag(name, split) {
            names.push(name.to_string());
        }
    }

    names.sort();
    Ok(names)
}

/// True when the split tag is a whole token of the file stem, so that
/// `latest_train` counts as train only.
fn has_split_tag(name: &str, split: Split) -> bool {
    let stem = name
        .strip_suffix(DATASET_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .unwrap_or(name);
    stem.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == split.tag())
}
