use std::path::PathBuf;

use thiserror::Error;

use crate::types::Split;

/// Dataset selection and loading errors
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to read dataset directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Rolling serial {serial} out of range: only {available} {split} windows available")]
    RollingSerialOutOfRange {
        serial: usize,
        available: usize,
        split: Split,
    },

    #[error("Failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} is missing required column `{column}`")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{path} line {line}: {message}")]
    InvalidRecord {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("{split} split has {found} assets, expected {expected}")]
    AssetCount {
        split: Split,
        found: usize,
        expected: usize,
    },

    #[error("{split} split has {found} feature columns, expected {expected}")]
    FeatureCount {
        split: Split,
        found: usize,
        expected: usize,
    },

    #[error("{split} split does not share the train asset universe: {symbol} differs")]
    AssetMismatch { split: Split, symbol: String },

    #[error("{split} split has an empty {period} period")]
    EmptyPeriod { split: Split, period: &'static str },

    #[error("{split} split has no {period} observation for {symbol} at {date}")]
    MissingObservation {
        split: Split,
        period: &'static str,
        symbol: String,
        date: String,
    },

    #[error("{split} split has duplicate {period} observations for {symbol} at {date}")]
    DuplicateObservation {
        split: Split,
        period: &'static str,
        symbol: String,
        date: String,
    },
}

/// Pair file parsing and action resolution errors
#[derive(Error, Debug)]
pub enum PairError {
    #[error("Failed to read pairs from {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} has no `pairs` column")]
    MissingColumn { path: PathBuf },

    #[error("Malformed pair identifier `{0}`: expected <prefix>_<A>-<B>")]
    Malformed(String),

    #[error("Rolling serial {serial} out of range: only {available} pairs selected")]
    SerialOutOfRange { serial: usize, available: usize },

    #[error("Symbol {0} is not in the asset universe")]
    UnknownSymbol(String),
}

/// Errors raised by an environment backend
#[derive(Error, Debug)]
pub enum EnvError {
    #[error("Environment backend error: {0}")]
    Backend(String),

    #[error("Environment {env} has no trained policy")]
    MissingPolicy { env: String },

    #[error("Step info is missing `{0}`")]
    MissingInfo(&'static str),

    #[error("Action {action} maps outside the {assets} asset universe")]
    ActionOutOfRange { action: String, assets: usize },
}

/// Tracking sink errors
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Tracking I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode run record: {0}")]
    Encode(String),

    #[error("Failed to render trajectory figure: {0}")]
    Render(String),

    #[error("Tracking backend error: {0}")]
    Backend(String),
}

/// Anything that ends a run
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Pair(#[from] PairError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),
}
