//! Value table file format
//!
//! A whole-file record list encoded with bincode and compressed with lz4
//! (size-prepended). Saves go to a temp file that is renamed over the target.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::state::{ActionKey, StateKey};
use super::table::{QEntry, QStats, QTable};
use crate::error::PersistenceError;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub state: String,
    pub action: String,
    pub value: f32,
    pub visits: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ValueTableFile {
    version: u32,
    stats: QStats,
    records: Vec<ValueRecord>,
}

/// Write `table` to `path`, replacing any existing file
pub fn save_table(table: &QTable, path: &Path) -> Result<(), PersistenceError> {
    let file = ValueTableFile {
        version: FORMAT_VERSION,
        stats: *table.stats(),
        records: table
            .records()
            .into_iter()
            .map(|(state, action, entry)| ValueRecord {
                state: state.0,
                action: action.0,
                value: entry.value,
                visits: entry.visits,
            })
            .collect(),
    };

    let serialized = bincode_next::serde::encode_to_vec(&file, bincode_next::config::standard())
        .map_err(|e| PersistenceError::Encode {
            what: "value table",
            message: e.to_string(),
        })?;
    let compressed = lz4_flex::compress_prepend_size(&serialized);

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
    }

    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, &compressed).map_err(|e| PersistenceError::io(&temp_path, e))?;
    std::fs::rename(&temp_path, path).map_err(|e| PersistenceError::io(path, e))?;

    log::info!(
        "Saved value table: {} entries, {} bytes compressed, {:?}",
        file.records.len(),
        compressed.len(),
        path
    );
    Ok(())
}

/// Read a table written by [`save_table`]. A missing file is an empty table.
pub fn load_table(path: &Path) -> Result<QTable, PersistenceError> {
    if !path.exists() {
        log::info!("No value table at {:?}, starting empty", path);
        return Ok(QTable::new());
    }

    let compressed = std::fs::read(path).map_err(|e| PersistenceError::io(path, e))?;
    let serialized =
        lz4_flex::decompress_size_prepended(&compressed).map_err(|e| PersistenceError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let (file, _): (ValueTableFile, _) =
        bincode_next::serde::decode_from_slice(&serialized, bincode_next::config::standard())
            .map_err(|e| PersistenceError::Decode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

    if file.version != FORMAT_VERSION {
        return Err(PersistenceError::Decode {
            path: path.to_path_buf(),
            message: format!("unsupported format version {}", file.version),
        });
    }

    let mut table = QTable::new();
    for record in file.records {
        table.insert(
            StateKey(record.state),
            ActionKey(record.action),
            QEntry {
                value: record.value,
                visits: record.visits,
            },
        );
    }
    table.set_stats(file.stats);

    log::info!("Loaded value table: {} entries from {:?}", table.len(), path);
    Ok(table)
}
