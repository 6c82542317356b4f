//! JSON file loader.
//!
//! An identifier is either a path to a `.json` file, used as given, or a bare
//! symbol, which resolves to `<root>/<SYMBOL>.json`.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tickflow_core::{PipelineError, RecordLoader, Result, StockData};
use tracing::{debug, trace, warn};

/// Reads one [`StockData`] document per file.
#[derive(Debug, Clone)]
pub struct JsonFileLoader {
    root: PathBuf,
}

impl JsonFileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `identifier`
    pub fn resolve(&self, identifier: &str) -> PathBuf {
        let path = Path::new(identifier);
        if path.extension().is_some_and(|ext| ext == "json") {
            path.to_path_buf()
        } else {
            self.root.join(format!("{}.json", identifier))
        }
    }

    /// Load `identifier`, failing with `Timeout` if it takes longer than `after`.
    pub async fn load_with_timeout(&self, identifier: &str, after: Duration) -> Result<StockData> {
        tokio::time::timeout(after, self.load_one(identifier))
            .await
            .map_err(|_| PipelineError::timeout(identifier, after))?
    }
}

#[async_trait]
impl RecordLoader for JsonFileLoader {
    async fn load_one(&self, identifier: &str) -> Result<StockData> {
        let path = self.resolve(identifier);
        trace!(path = %path.display(), "Reading record");

        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::not_found(identifier),
            _ => PipelineError::Io(e),
        })?;

        let record: StockData = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::decode(identifier, e.to_string()))?;

        debug!(identifier, symbol = %record.symbol, days = record.daily_data.len(), "Loaded record");
        Ok(record)
    }
}

/// List the `*.json` files directly under `dir`, sorted by path.
///
/// Files whose path is not valid UTF-8 cannot be named by an identifier and
/// are skipped.
pub fn discover_inputs(dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PipelineError::not_found(dir.display().to_string()),
        _ => PipelineError::Io(e),
    })?;

    let mut inputs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        match path.to_str() {
            Some(name) => inputs.push(name.to_string()),
            None => warn!(path = %path.display(), "Skipping input with a non UTF-8 name"),
        }
    }
    inputs.sort();

    debug!(dir = %dir.display(), count = inputs.len(), "Discovered inputs");
    Ok(inputs)
}
