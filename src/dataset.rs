//! CSV reading and writing for the input dataset and stage artifacts.
//!
//! The input dataset is a headered CSV with `prompt` and `answer` columns.
//! Stage artifacts are CSV blobs: preference tables for the labeling stage,
//! a one-row checkpoint manifest for the training stage. An empty field and
//! `None` are interchangeable for the optional answer columns.

use crate::models::{ModelCheckpoint, PreferenceExample, PreftuneError, RawExample, Result};
use std::path::Path;

/// Read raw prompt/answer rows from the input dataset.
pub fn read_raw_dataset(path: &Path) -> Result<Vec<RawExample>> {
    if !path.exists() {
        return Err(PreftuneError::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| PreftuneError::MalformedInput(format!("opening {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| PreftuneError::MalformedInput(format!("reading header row: {e}")))?
        .clone();
    for required in ["prompt", "answer"] {
        if !headers.iter().any(|h| h == required) {
            return Err(PreftuneError::MalformedInput(format!(
                "missing required column '{required}' in {}",
                path.display()
            )));
        }
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize().enumerate() {
        // Rows are 1-based and the header occupies the first line.
        let row: RawExample = record
            .map_err(|e| PreftuneError::MalformedInput(format!("row {}: {e}", idx + 2)))?;
        rows.push(row);
    }

    Ok(rows)
}

/// Encode a preference table as a CSV artifact blob.
pub fn preferences_to_csv(rows: &[PreferenceExample]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| PreftuneError::Internal(format!("serializing preference row: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| PreftuneError::Internal(format!("finalizing preference csv: {e}")))
}

/// Decode a preference table from a CSV artifact blob.
pub fn preferences_from_csv(bytes: &[u8]) -> Result<Vec<PreferenceExample>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize().enumerate() {
        let row: PreferenceExample = record.map_err(|e| {
            PreftuneError::MalformedInput(format!("preference artifact row {}: {e}", idx + 2))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Encode a checkpoint manifest as a one-row CSV artifact blob.
pub fn manifest_to_csv(checkpoint: &ModelCheckpoint) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .serialize(checkpoint)
        .map_err(|e| PreftuneError::Internal(format!("serializing checkpoint manifest: {e}")))?;
    writer
        .into_inner()
        .map_err(|e| PreftuneError::Internal(format!("finalizing manifest csv: {e}")))
}

/// Decode a checkpoint manifest from a CSV artifact blob.
pub fn manifest_from_csv(bytes: &[u8]) -> Result<ModelCheckpoint> {
    let mut reader = csv::Reader::from_reader(bytes);
    match reader.deserialize().next() {
        Some(record) => record
            .map_err(|e| PreftuneError::MalformedInput(format!("checkpoint manifest: {e}"))),
        None => Err(PreftuneError::MalformedInput(
            "checkpoint manifest is empty".to_string(),
        )),
    }
}
