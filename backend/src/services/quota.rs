use crate::error::Result;
use crate::models::{QuotaState, QuotaStatus};
use crate::services::sheet_store::SheetStore;
use chrono::Utc;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

const QUOTA_SHEET: &str = "Quota";

/// Persisted running total of API cost units.
///
/// Every charge is a read-add-write against the quota file performed under a
/// single async mutex, so interleaved call chains never read a stale total.
/// The daily limit is advisory and only reported.
pub struct QuotaLedger {
    store: Arc<SheetStore>,
    path: PathBuf,
    daily_limit: u64,
    writer: Mutex<()>,
}

impl QuotaLedger {
    pub fn new(store: Arc<SheetStore>, path: PathBuf, daily_limit: u64) -> Self {
        QuotaLedger {
            store,
            path,
            daily_limit,
            writer: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<QuotaState> {
        let rows: Vec<QuotaState> = self.store.read_rows(&self.path).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    /// Adds `cost` to the persisted total and returns it. When the ledger
    /// cannot be read or written the charge is lost, only logged, and no
    /// total is returned.
    pub async fn charge(&self, cost: u64) -> Option<u64> {
        let _writer = self.writer.lock().await;

        let mut state = match self.load().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Could not read quota state, charge of {cost} units lost: {e}");
                return None;
            }
        };
        state.used_quota += cost;

        if state.used_quota > self.daily_limit {
            warn!(
                "Quota usage {} is past the daily limit of {}",
                state.used_quota, self.daily_limit
            );
        }
        match self
            .store
            .overwrite(&self.path, &[state.clone()], QUOTA_SHEET)
            .await
        {
            Ok(()) => Some(state.used_quota),
            Err(e) => {
                warn!("Could not persist quota charge of {cost} units: {e}");
                None
            }
        }
    }

    pub async fn used(&self) -> Result<u64> {
        let _writer = self.writer.lock().await;
        Ok(self.load().await?.used_quota)
    }

    pub async fn status(&self) -> Result<QuotaStatus> {
        let _writer = self.writer.lock().await;
        let state = self.load().await?;
        Ok(QuotaStatus {
            used: state.used_quota,
            daily_limit: self.daily_limit,
            cycle_started_at: state.cycle_started_at,
        })
    }

    /// Starts a new cycle with a zero total.
    pub async fn reset(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        let state = QuotaState {
            used_quota: 0,
            cycle_started_at: Utc::now(),
        };
        self.store.overwrite(&self.path, &[state], QUOTA_SHEET).await?;
        info!("Quota cycle reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger(dir: &TempDir) -> Arc<QuotaLedger> {
        let store = Arc::new(SheetStore::new(["quota.json"]));
        Arc::new(QuotaLedger::new(store, dir.path().join("quota.json"), 10_000))
    }

    #[tokio::test]
    async fn charges_accumulate_across_instances() {
        let dir = TempDir::new().unwrap();
        assert_eq!(ledger(&dir).charge(100).await, Some(100));
        assert_eq!(ledger(&dir).charge(1).await, Some(101));
        assert_eq!(ledger(&dir).used().await.unwrap(), 101);
    }

    #[tokio::test]
    async fn unreadable_ledger_reports_no_total() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("quota.json"), b"garbage").unwrap();
        let quota = ledger(&dir);

        assert_eq!(quota.charge(100).await, None);
        // The charge is dropped, not written over the unreadable file.
        assert_eq!(
            std::fs::read(dir.path().join("quota.json")).unwrap(),
            b"garbage"
        );
        assert!(quota.used().await.is_err());
    }

    #[tokio::test]
    async fn interleaved_charges_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let quota = ledger(&dir);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let quota = quota.clone();
            handles.push(tokio::spawn(async move { quota.charge(5).await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(quota.used().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn reset_starts_a_new_cycle() {
        let dir = TempDir::new().unwrap();
        let quota = ledger(&dir);
        quota.charge(300).await;
        quota.reset().await.unwrap();

        let status = quota.status().await.unwrap();
        assert_eq!(status.used, 0);
        assert_eq!(status.daily_limit, 10_000);
    }

    #[tokio::test]
    async fn exclusion_keeps_quota_file_free_of_backups() {
        let dir = TempDir::new().unwrap();
        let quota = ledger(&dir);
        quota.charge(1).await;
        quota.charge(1).await;

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
