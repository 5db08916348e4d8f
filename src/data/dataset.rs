use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, NaiveDateTime};
use hashbrown::HashMap;
use ndarray::{Array2, Array3};
use tracing::info;

use crate::{
    constants::columns,
    error::DatasetError,
    types::Split,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    Formation,
    Trading,
}

impl PeriodKind {
    pub fn name(&self) -> &'static str {
        match self {
            PeriodKind::Formation => columns::FORMATION,
            PeriodKind::Trading => columns::TRADING,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            columns::FORMATION => Some(PeriodKind::Formation),
            columns::TRADING => Some(PeriodKind::Trading),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Row {
    date: NaiveDateTime,
    period: PeriodKind,
    symbol: String,
    close: f64,
    features: Vec<f64>,
}

/// One rolling-window file, as read from disk.
#[derive(Debug, Clone)]
pub struct Frame {
    path: PathBuf,
    feature_names: Vec<String>,
    rows: Vec<Row>,
}

impl Frame {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn symbols(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|row| row.symbol.as_str()).collect()
    }
}

/// Market data of one period: assets x time x features, assets x time log prices.
#[derive(Debug, Clone)]
pub struct PeriodData {
    pub dates: Vec<NaiveDateTime>,
    pub features: Array3<f64>,
    pub log_prices: Array2<f64>,
}

impl PeriodData {
    pub fn first_date(&self) -> Option<&NaiveDateTime> {
        self.dates.first()
    }

    pub fn last_date(&self) -> Option<&NaiveDateTime> {
        self.dates.last()
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.features.dim()
    }
}

/// Formation and trading data of one split.
#[derive(Debug, Clone)]
pub struct SplitDataset {
    pub formation: PeriodData,
    pub trading: PeriodData,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub asset_names: Vec<String>,
    pub train: SplitDataset,
    pub valid: SplitDataset,
    pub test: SplitDataset,
}

impl Dataset {
    pub fn split(&self, split: Split) -> &SplitDataset {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
            Split::Test => &self.test,
        }
    }

    pub fn asset_num(&self) -> usize {
        self.asset_names.len()
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(date) = NaiveDateTime::parse_from_str(value, format) {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Reads one rolling-window CSV. Columns other than date, period, symbol and
/// close are features, kept in header order.
pub fn load_data(path: &Path) -> Result<Frame, DatasetError> {
    let csv_error = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let headers = reader.headers().map_err(csv_error)?.clone();

    let column = |name: &'static str| {
        headers
            .iter()
            .position(|header| header.trim() == name)
            .ok_or_else(|| DatasetError::MissingColumn {
                path: path.to_path_buf(),
                column: name,
            })
    };
    let date_col = column(columns::DATE)?;
    let period_col = column(columns::PERIOD)?;
    let symbol_col = column(columns::SYMBOL)?;
    let close_col = column(columns::CLOSE)?;

    let feature_cols: Vec<usize> = (0..headers.len())
        .filter(|index| ![date_col, period_col, symbol_col, close_col].contains(index))
        .collect();
    let feature_names = feature_cols
        .iter()
        .map(|&index| headers[index].trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let invalid = |message: String| DatasetError::InvalidRecord {
            path: path.to_path_buf(),
            line,
            message,
        };

        let field = |index: usize| record.get(index).unwrap_or("").trim();

        let date = parse_date(field(date_col))
            .ok_or_else(|| invalid(format!("unparseable date `{}`", field(date_col))))?;
        let period = PeriodKind::parse(field(period_col))
            .ok_or_else(|| invalid(format!("unknown period `{}`", field(period_col))))?;
        let symbol = field(symbol_col);
        if symbol.is_empty() {
            return Err(invalid("empty symbol".to_string()));
        }
        let close: f64 = field(close_col)
            .parse()
            .map_err(|_| invalid(format!("unparseable close `{}`", field(close_col))))?;
        if !(close > 0.0 && close.is_finite()) {
            return Err(invalid(format!("close must be positive, got {close}")));
        }

        let mut features = Vec::with_capacity(feature_cols.len());
        for &index in &feature_cols {
            let value: f64 = field(index).parse().map_err(|_| {
                invalid(format!(
                    "unparseable {} `{}`",
                    headers[index].trim(),
                    field(index)
                ))
            })?;
            features.push(value);
        }

        rows.push(Row {
            date,
            period,
            symbol: symbol.to_string(),
            close,
            features,
        });
    }

    Ok(Frame {
        path: path.to_path_buf(),
        feature_names,
        rows,
    })
}

/// Turns the three frames of one rolling window into dense tensors sharing the
/// train split's asset ordering.
pub fn build_dataset(
    train: &Frame,
    valid: &Frame,
    test: &Frame,
    asset_num: usize,
    feature_dim: usize,
) -> Result<Dataset, DatasetError> {
    let asset_names: Vec<String> = train.symbols().into_iter().map(String::from).collect();
    if asset_names.len() != asset_num {
        return Err(DatasetError::AssetCount {
            split: Split::Train,
            found: asset_names.len(),
            expected: asset_num,
        });
    }

    let asset_index: HashMap<&str, usize> = asset_names
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), index))
        .collect();

    let build = |split: Split, frame: &Frame| -> Result<SplitDataset, DatasetError> {
        if frame.feature_names.len() != feature_dim {
            return Err(DatasetError::FeatureCount {
                split,
                found: frame.feature_names.len(),
                expected: feature_dim,
            });
        }

        let symbols = frame.symbols();
        if let Some(symbol) = asset_names
            .iter()
            .map(String::as_str)
            .find(|name| !symbols.contains(name))
            .or_else(|| symbols.iter().copied().find(|s| !asset_index.contains_key(s)))
        {
            return Err(DatasetError::AssetMismatch {
                split,
                symbol: symbol.to_string(),
            });
        }

        Ok(SplitDataset {
            formation: build_period(
                frame,
                split,
                PeriodKind::Formation,
                &asset_names,
                &asset_index,
                feature_dim,
            )?,
            trading: build_period(
                frame,
                split,
                PeriodKind::Trading,
                &asset_names,
                &asset_index,
                feature_dim,
            )?,
        })
    };

    let train_dataset = build(Split::Train, train)?;
    let valid_dataset = build(Split::Valid, valid)?;
    let test_dataset = build(Split::Test, test)?;
    drop(asset_index);

    Ok(Dataset {
        asset_names,
        train: train_dataset,
        valid: valid_dataset,
        test: test_dataset,
    })
}

fn build_period(
    frame: &Frame,
    split: Split,
    kind: PeriodKind,
    asset_names: &[String],
    asset_index: &HashMap<&str, usize>,
    feature_dim: usize,
) -> Result<PeriodData, DatasetError> {
    let rows: Vec<&Row> = frame.rows.iter().filter(|row| row.period == kind).collect();

    let date_index: BTreeMap<NaiveDateTime, usize> = rows
        .iter()
        .map(|row| row.date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(index, date)| (date, index))
        .collect();
    if date_index.is_empty() {
        return Err(DatasetError::EmptyPeriod {
            split,
            period: kind.name(),
        });
    }

    let assets = asset_names.len();
    let steps = date_index.len();
    let mut features = Array3::<f64>::zeros((assets, steps, feature_dim));
    let mut log_prices = Array2::<f64>::zeros((assets, steps));
    let mut filled = Array2::<bool>::from_elem((assets, steps), false);

    for row in rows {
        let asset = asset_index[row.symbol.as_str()];
        let step = date_index[&row.date];
        if filled[[asset, step]] {
            return Err(DatasetError::DuplicateObservation {
                split,
                period: kind.name(),
                symbol: row.symbol.clone(),
                date: row.date.to_string(),
            });
        }
        filled[[asset, step]] = true;
        log_prices[[asset, step]] = row.close.ln();
        for (feature, value) in row.features.iter().enumerate() {
            features[[asset, step, feature]] = *value;
        }
    }

    let dates: Vec<NaiveDateTime> = date_index.into_keys().collect();
    if let Some(((asset, step), _)) = filled.indexed_iter().find(|(_, is_filled)| !**is_filled) {
        return Err(DatasetError::MissingObservation {
            split,
            period: kind.name(),
            symbol: asset_names[asset].clone(),
            date: dates[step].to_string(),
        });
    }

    Ok(PeriodData {
        dates,
        features,
        log_prices,
    })
}

pub fn log_dataset(split: Split, dataset: &SplitDataset) {
    let date = |date: Option<&NaiveDateTime>| date.map(|d| d.to_string()).unwrap_or_default();

    info!(
        %split,
        formation_start = %date(dataset.formation.first_date()),
        formation_end = %date(dataset.formation.last_date()),
        formation_size = ?dataset.formation.shape(),
        trading_start = %date(dataset.trading.first_date()),
        trading_end = %date(dataset.trading.last_date()),
        trading_size = ?dataset.trading.shape(),
        "generated dataset (N x T x M)"
    );
}
