use std::path::Path;

use hashbrown::HashMap;
use tracing::info;

use crate::{constants::columns::PAIRS, error::PairError, types::PairAction};

/// Two symbols selected for one rolling window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolPair {
    pub first: String,
    pub second: String,
}

/// Parses `<prefix>_<A>-<B>`. Only the text after the last underscore names
/// the pair, so prefixes may contain underscores.
pub fn parse_pair_id(id: &str) -> Result<SymbolPair, PairError> {
    let id = id.trim();
    let tail = match id.rfind('_') {
        Some(index) => &id[index + 1..],
        None => id,
    };

    let mut parts = tail.split('-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), None) if !first.is_empty() && !second.is_empty() => {
            Ok(SymbolPair {
                first: first.to_string(),
                second: second.to_string(),
            })
        }
        _ => Err(PairError::Malformed(id.to_string())),
    }
}

/// Reads the raw identifiers of the `pairs` column, one per rolling window.
/// Identifiers are parsed only once their window is selected.
pub fn load_pairs(path: &Path) -> Result<Vec<String>, PairError> {
    let csv_error = |source| PairError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let column = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .position(|header| header.trim() == PAIRS)
        .ok_or_else(|| PairError::MissingColumn {
            path: path.to_path_buf(),
        })?;

    let mut pair_ids = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        pair_ids.push(record.get(column).unwrap_or("").trim().to_string());
    }

    info!(path = %path.display(), count = pair_ids.len(), "loaded selected pairs");
    Ok(pair_ids)
}

/// Maps the pair of rolling window `serial` onto indices of `asset_names`.
pub fn resolve_action(
    pair_ids: &[String],
    serial: usize,
    asset_names: &[String],
) -> Result<PairAction, PairError> {
    let pair_id = pair_ids.get(serial).ok_or(PairError::SerialOutOfRange {
        serial,
        available: pair_ids.len(),
    })?;
    let pair = parse_pair_id(pair_id)?;

    let index: HashMap<&str, usize> = asset_names
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), index))
        .collect();
    let lookup = |symbol: &str| {
        index
            .get(symbol)
            .copied()
            .ok_or_else(|| PairError::UnknownSymbol(symbol.to_string()))
    };

    let action = PairAction::new(lookup(&pair.first)?, lookup(&pair.second)?);
    info!(
        first = %pair.first,
        second = %pair.second,
        %action,
        "resolved trading action"
    );
    Ok(action)
}
