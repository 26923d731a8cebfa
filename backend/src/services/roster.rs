use crate::error::{CollectorError, Result};
use crate::models::{ChannelHistorySnapshot, ChannelRecord, ChannelStats};
use crate::services::cancel::CancelToken;
use crate::services::locks::FileLocks;
use crate::services::sheet_store::SheetStore;
use crate::services::stages::StageFetchers;
use crate::utils::{parse_channel_input, ChannelInput};
use chrono::{DateTime, Utc};
use log::info;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

pub const ROSTER_SHEET: &str = "Channels";
pub const HISTORY_SHEET: &str = "History";

/// Applies fresh stats to the roster by channel id. Channels without fresh
/// stats pass through untouched. Returns one snapshot per updated channel.
pub fn merge_stats(
    roster: &mut [ChannelRecord],
    stats: &[ChannelStats],
    fetched_at: DateTime<Utc>,
) -> Vec<ChannelHistorySnapshot> {
    let by_id: HashMap<&str, &ChannelStats> = stats
        .iter()
        .map(|s| (s.channel_id.as_str(), s))
        .collect();

    let mut snapshots = Vec::new();
    for record in roster.iter_mut() {
        if let Some(fresh) = by_id.get(record.channel_id.as_str()) {
            record.apply_stats(fresh, fetched_at);
            snapshots.push(record.snapshot());
        }
    }
    snapshots
}

/// The durable set of tracked channels plus their append-only history.
pub struct ChannelRoster {
    store: Arc<SheetStore>,
    locks: Arc<FileLocks>,
    roster_path: PathBuf,
    history_path: PathBuf,
}

impl ChannelRoster {
    pub fn new(
        store: Arc<SheetStore>,
        locks: Arc<FileLocks>,
        roster_path: PathBuf,
        history_path: PathBuf,
    ) -> Self {
        ChannelRoster {
            store,
            locks,
            roster_path,
            history_path,
        }
    }

    /// Exclusive access to the roster file for a read-modify-write sequence.
    pub async fn lock(&self) -> OwnedMutexGuard<()> {
        self.locks.lock(&self.roster_path).await
    }

    /// Unlocked read; callers that write back must hold `lock()`.
    pub async fn load(&self) -> Result<Vec<ChannelRecord>> {
        self.store.read_rows(&self.roster_path).await
    }

    /// Unlocked write; callers must hold `lock()`.
    pub async fn save(&self, records: &[ChannelRecord]) -> Result<()> {
        self.store
            .overwrite(&self.roster_path, records, ROSTER_SHEET)
            .await
    }

    /// Read-merge-append-write of the history ledger.
    pub async fn append_history(&self, snapshots: &[ChannelHistorySnapshot]) -> Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let _guard = self.locks.lock(&self.history_path).await;

        let mut history: Vec<ChannelHistorySnapshot> =
            self.store.read_rows(&self.history_path).await?;
        history.extend_from_slice(snapshots);
        self.store
            .overwrite(&self.history_path, &history, HISTORY_SHEET)
            .await?;
        info!(
            "Appended {} snapshots to history ({} total)",
            snapshots.len(),
            history.len()
        );
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ChannelRecord>> {
        self.load().await
    }

    pub async fn history(&self, channel_id: &str) -> Result<Vec<ChannelHistorySnapshot>> {
        let history: Vec<ChannelHistorySnapshot> =
            self.store.read_rows(&self.history_path).await?;
        Ok(history
            .into_iter()
            .filter(|snapshot| snapshot.channel_id == channel_id)
            .collect())
    }

    /// Merges stats into the roster, creating records for unknown channels.
    /// Returns the number of newly created records.
    pub async fn upsert(&self, stats: &[ChannelStats], fetched_at: DateTime<Utc>) -> Result<usize> {
        if stats.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock().await;

        let mut records = self.load().await?;
        merge_stats(&mut records, stats, fetched_at);

        let mut created = 0;
        for fresh in stats {
            if !records.iter().any(|r| r.channel_id == fresh.channel_id) {
                records.push(ChannelRecord::from_stats(fresh, fetched_at));
                created += 1;
            }
        }

        self.save(&records).await?;
        info!(
            "Roster upsert: {} channels seen, {created} new, {} tracked",
            stats.len(),
            records.len()
        );
        Ok(created)
    }

    /// Resolves a channel id, handle or channel URL and adds it to the roster.
    pub async fn add_channel(
        &self,
        input: &str,
        stages: &StageFetchers,
        cancel: &CancelToken,
    ) -> Result<ChannelRecord> {
        info!("Adding channel to roster: {input}");

        let stats = match parse_channel_input(input) {
            Some(ChannelInput::Id(id)) => stages
                .channel_stats(std::slice::from_ref(&id), cancel)
                .await?
                .into_iter()
                .next(),
            Some(ChannelInput::Handle(handle)) => stages.channel_by_handle(&handle, cancel).await?,
            None => {
                return Err(CollectorError::InvalidRequest(format!(
                    "'{input}' is not a channel id, handle or channel URL"
                )))
            }
        };
        let stats = stats.ok_or_else(|| {
            CollectorError::InvalidRequest(format!("No channel found for '{input}'"))
        })?;

        let fetched_at = Utc::now();
        self.upsert(std::slice::from_ref(&stats), fetched_at).await?;
        Ok(ChannelRecord::from_stats(&stats, fetched_at))
    }

    /// Manual removal. Returns false if the channel was not tracked.
    pub async fn remove(&self, channel_id: &str) -> Result<bool> {
        let _guard = self.lock().await;

        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|record| record.channel_id != channel_id);
        if records.len() == before {
            return Ok(false);
        }

        self.save(&records).await?;
        info!("Removed channel {channel_id} from roster");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, subscribers: u64) -> ChannelRecord {
        ChannelRecord {
            channel_id: id.to_string(),
            name: format!("old {id}"),
            handle: Some(format!("@{id}")),
            subscriber_count: Some(subscribers),
            view_count: 10,
            video_count: 1,
            icon: "old.png".to_string(),
            fetched_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn stats(id: &str, subscribers: Option<u64>) -> ChannelStats {
        ChannelStats {
            channel_id: id.to_string(),
            name: format!("new {id}"),
            handle: None,
            subscriber_count: subscribers,
            view_count: 99,
            video_count: 7,
            icon: String::new(),
        }
    }

    #[test]
    fn merge_updates_matches_and_passes_others_through() {
        let fetched_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut roster = vec![record("A", 5), record("B", 6)];
        let untouched = roster[1].clone();

        let snapshots = merge_stats(
            &mut roster,
            &[stats("A", None), stats("Z", Some(1))],
            fetched_at,
        );

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].channel_id, "A");
        assert_eq!(snapshots[0].fetched_at, fetched_at);
        assert_eq!(snapshots[0].subscriber_count, None);

        assert_eq!(roster[0].name, "new A");
        assert_eq!(roster[0].handle.as_deref(), Some("@A"));
        assert_eq!(roster[0].icon, "old.png");
        assert_eq!(roster[0].video_count, 7);
        assert_eq!(roster[1], untouched);
        assert_eq!(roster.len(), 2);
    }
}
