use crate::error::{CollectorError, Result};
use crate::models::{CollectFilters, ResultRow};
use crate::services::cancel::CancelToken;
use crate::services::pipeline::FilterPipeline;
use crate::services::roster::ChannelRoster;
use crate::services::sheet_store::SheetStore;
use chrono::Utc;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

pub const RESULTS_SHEET: &str = "Results";

/// Ad-hoc "collect now": runs the pipeline, records every enriched channel in
/// the roster and optionally saves the rows as a named result sheet.
pub struct CollectionService {
    pipeline: FilterPipeline,
    roster: Arc<ChannelRoster>,
    store: Arc<SheetStore>,
    results_dir: PathBuf,
}

impl CollectionService {
    pub fn new(
        pipeline: FilterPipeline,
        roster: Arc<ChannelRoster>,
        store: Arc<SheetStore>,
        results_dir: PathBuf,
    ) -> Self {
        CollectionService {
            pipeline,
            roster,
            store,
            results_dir,
        }
    }

    pub async fn collect(
        &self,
        filters: &CollectFilters,
        save_as: Option<&str>,
    ) -> Result<Vec<ResultRow>> {
        let target = save_as.map(|name| self.result_path(name)).transpose()?;

        let collection = self.pipeline.collect(filters, &CancelToken::new()).await?;
        info!(
            "Collected {} of {} requested rows over {} page(s)",
            collection.rows.len(),
            filters.target_count,
            collection.pages_fetched
        );

        if !collection.channels.is_empty() {
            self.roster.upsert(&collection.channels, Utc::now()).await?;
        }
        if let Some(path) = target {
            self.store
                .overwrite(&path, &collection.rows, RESULTS_SHEET)
                .await?;
        }
        Ok(collection.rows)
    }

    fn result_path(&self, name: &str) -> Result<PathBuf> {
        let name = name.trim();
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '));
        if !valid {
            return Err(CollectorError::InvalidRequest(format!(
                "'{name}' is not a usable result sheet name"
            )));
        }

        let file_name = if name.contains('.') {
            name.to_string()
        } else {
            format!("{name}.xlsx")
        };
        Ok(self.results_dir.join(file_name))
    }
}
