//! Durable read / overwrite of sheet files.
//!
//! `overwrite` never leaves the target half-written: the new content is
//! serialized in memory, written to a sibling temp file and renamed onto the
//! target. Until that rename the previous file is untouched. Before replacing
//! an existing file a dated backup sibling is taken, one per calendar day,
//! unless the file name is in the exclusion set.

use crate::error::{CollectorError, Result};
use chrono::{Local, NaiveDate};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct SheetDocument {
    sheet: String,
    header: Vec<String>,
    rows: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SheetStore {
    backup_exclusions: HashSet<String>,
}

impl SheetStore {
    pub fn new<I, S>(backup_exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SheetStore {
            backup_exclusions: backup_exclusions.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads every row of the file as a record. A missing file has no rows.
    pub async fn read_rows<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CollectorError::persistence(path, e)),
        };

        let document: SheetDocument = serde_json::from_slice(&bytes)?;
        document
            .rows
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(CollectorError::from))
            .collect()
    }

    pub async fn overwrite<T: Serialize>(
        &self,
        path: &Path,
        rows: &[T],
        sheet_name: &str,
    ) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CollectorError::persistence(parent, e))?;
        }

        let exists = fs::try_exists(path)
            .await
            .map_err(|e| CollectorError::persistence(path, e))?;
        if exists && self.wants_backup(path) {
            let backup = backup_path(path, Local::now().date_naive());
            fs::copy(path, &backup)
                .await
                .map_err(|e| CollectorError::persistence(&backup, e))?;
            info!("Backed up {} to {}", path.display(), backup.display());
        }

        let buffer = encode_sheet(rows, sheet_name)?;

        let temp = temp_path(path);
        if let Err(e) = write_synced(&temp, &buffer).await {
            let _ = fs::remove_file(&temp).await;
            return Err(CollectorError::persistence(&temp, e));
        }

        if let Err(e) = fs::rename(&temp, path).await {
            error!(
                "Rename of {} onto {} failed, leaving temp file in place: {e}",
                temp.display(),
                path.display()
            );
            return Err(CollectorError::Rename {
                from: temp,
                to: path.to_path_buf(),
                source: e,
            });
        }
        if let Err(e) = sync_parent_directory(path).await {
            warn!("Could not sync directory of {}: {e}", path.display());
        }

        info!(
            "Wrote {} rows to {} ({sheet_name})",
            rows.len(),
            path.display()
        );
        Ok(())
    }

    fn wants_backup(&self, path: &Path) -> bool {
        match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => !self.backup_exclusions.contains(name),
            None => {
                warn!("No file name in {}, skipping backup", path.display());
                false
            }
        }
    }
}

/// Writes the buffer and flushes it to disk before the caller renames it.
async fn write_synced(path: &Path, buffer: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(buffer).await?;
    file.sync_all().await
}

async fn sync_parent_directory(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::File::open(parent).await?.sync_all().await?;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Sheets are stored as a JSON document. The `.xlsx` names of the roster,
/// history and result files are nominal; spreadsheet tools cannot open them.
fn encode_sheet<T: Serialize>(rows: &[T], sheet_name: &str) -> Result<Vec<u8>> {
    let rows = rows
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<Value>, _>>()?;

    let header = rows
        .first()
        .and_then(Value::as_object)
        .map(|first| first.keys().cloned().collect())
        .unwrap_or_default();

    let document = SheetDocument {
        sheet: sheet_name.to_string(),
        header,
        rows,
    };
    Ok(serde_json::to_vec_pretty(&document)?)
}

/// `channels.xlsx` -> `channels[2024-05-01].back.xlsx`
pub fn backup_path(path: &Path, date: NaiveDate) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}[{}].back.{}", date.format("%Y-%m-%d"), ext.to_string_lossy()),
        None => format!("{stem}[{}].back", date.format("%Y-%m-%d")),
    };
    path.with_file_name(name)
}

/// Hidden sibling unique to one write: `.channels.xlsx.tmp.<pid>.<nanos>.<seq>`.
pub fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(
        ".{name}.tmp.{}.{nanos}.{seq}",
        std::process::id()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_name_keeps_extension() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            backup_path(Path::new("/data/channels.xlsx"), date),
            PathBuf::from("/data/channels[2024-05-01].back.xlsx")
        );
        assert_eq!(
            backup_path(Path::new("roster"), date),
            PathBuf::from("roster[2024-05-01].back")
        );
    }

    #[test]
    fn temp_file_is_a_fresh_hidden_sibling() {
        let first = temp_path(Path::new("/data/channels.xlsx"));
        let second = temp_path(Path::new("/data/channels.xlsx"));
        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(Path::new("/data")));
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".channels.xlsx.tmp."));
    }

    #[tokio::test]
    async fn synced_write_lands_whole() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sheet.xlsx");
        write_synced(&path, b"{\"rows\": []}").await.unwrap();
        sync_parent_directory(&path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"rows\": []}");
    }

    #[test]
    fn header_comes_from_first_row() {
        #[derive(Serialize)]
        struct Row {
            b: u32,
            a: &'static str,
        }
        let bytes = encode_sheet(&[Row { b: 1, a: "x" }], "Sheet1").unwrap();
        let document: SheetDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(document.sheet, "Sheet1");
        assert_eq!(document.header.len(), 2);
        assert!(document.header.iter().any(|h| h == "a"));
        assert!(document.header.iter().any(|h| h == "b"));
        assert_eq!(document.rows.len(), 1);
    }

    #[test]
    fn empty_sheet_has_empty_header() {
        let bytes = encode_sheet::<Value>(&[], "Sheet1").unwrap();
        let document: SheetDocument = serde_json::from_slice(&bytes).unwrap();
        assert!(document.header.is_empty());
        assert!(document.rows.is_empty());
    }
}
