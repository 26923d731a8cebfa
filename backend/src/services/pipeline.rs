//! Progressive search → detail → channel-stats pipeline.
//!
//! Per search source the pipeline walks result pages in descending view
//! order. Each page is checked cheaply against the view floor and, when a
//! views-per-hour floor is set, a quick pass over the pooled candidates. Paging
//! stops as soon as the pool is sufficient, the floor is breached, the cursor
//! runs out or the page ceiling is reached. Channel subscriber counts are only
//! fetched once the final set of videos is known.

use crate::error::Result;
use crate::models::{
    ChannelStats, CollectFilters, ResultRow, SearchQuery, VideoDetail, VideoSource,
};
use crate::services::cancel::CancelToken;
use crate::services::normalizer::{to_row, views_per_hour};
use crate::services::stages::StageFetchers;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::collections::{HashMap, HashSet};

/// Safety ceiling on search pages per source.
pub const MAX_PAGES: usize = 20;

/// Why paging of one source stopped (or that it goes on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Continue,
    Sufficient,
    FloorBreached,
    Exhausted,
    PageLimit,
}

#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub rows: Vec<ResultRow>,
    pub channels: Vec<ChannelStats>,
    pub pages_fetched: usize,
}

/// Request-scoped candidate state.
#[derive(Debug, Default)]
struct CandidatePool {
    seen: HashSet<String>,
    candidates: Vec<VideoDetail>,
}

impl CandidatePool {
    /// Keeps ids not seen earlier in this request, in page order.
    fn fresh_ids(&mut self, ids: Vec<String>) -> Vec<String> {
        ids.into_iter()
            .filter(|id| self.seen.insert(id.clone()))
            .collect()
    }

    /// Pools items at or above the floor. Returns true if any item of the
    /// page fell below it.
    fn admit(&mut self, details: Vec<VideoDetail>, min_views: u64) -> bool {
        let mut breached = false;
        for detail in details {
            if detail.view_count < min_views {
                breached = true;
            } else {
                self.candidates.push(detail);
            }
        }
        breached
    }

    fn is_sufficient(&self, want: usize, min_views_per_hour: f64, now: DateTime<Utc>) -> bool {
        if min_views_per_hour > 0.0 {
            quick_pass(&self.candidates, min_views_per_hour, want, now).len() >= want
        } else {
            self.candidates.len() >= want
        }
    }
}

/// Scans candidates in order and keeps those meeting the VPH floor, stopping
/// as soon as `want` are kept.
pub fn quick_pass<'a>(
    candidates: &'a [VideoDetail],
    min_views_per_hour: f64,
    want: usize,
    now: DateTime<Utc>,
) -> Vec<&'a VideoDetail> {
    let mut kept = Vec::with_capacity(want.min(candidates.len()));
    for detail in candidates {
        if kept.len() >= want {
            break;
        }
        if views_per_hour(detail, now) >= min_views_per_hour {
            kept.push(detail);
        }
    }
    kept
}

fn next_outcome(
    pool: &CandidatePool,
    filters: &CollectFilters,
    now: DateTime<Utc>,
    breached: bool,
    has_next: bool,
    pages: usize,
    max_pages: usize,
) -> PageOutcome {
    if pool.is_sufficient(filters.target_count, filters.min_views_per_hour, now) {
        PageOutcome::Sufficient
    } else if breached {
        PageOutcome::FloorBreached
    } else if !has_next {
        PageOutcome::Exhausted
    } else if pages >= max_pages {
        PageOutcome::PageLimit
    } else {
        PageOutcome::Continue
    }
}

pub struct FilterPipeline {
    stages: StageFetchers,
    max_pages: usize,
}

impl FilterPipeline {
    pub fn new(stages: StageFetchers) -> Self {
        FilterPipeline {
            stages,
            max_pages: MAX_PAGES,
        }
    }

    pub async fn collect(
        &self,
        filters: &CollectFilters,
        cancel: &CancelToken,
    ) -> Result<Collection> {
        self.collect_at(filters, Utc::now(), cancel).await
    }

    /// `collect` with an explicit clock for age-derived metrics.
    pub async fn collect_at(
        &self,
        filters: &CollectFilters,
        now: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Collection> {
        let source = filters.source()?;
        let want = filters.target_count;
        if want == 0 {
            return Ok(Collection::default());
        }

        let published_after = filters
            .recency_days
            .map(|days| now - Duration::days(i64::from(days)));
        let queries: Vec<SearchQuery> = match source {
            VideoSource::Keyword(keyword) => vec![SearchQuery {
                keyword: Some(keyword),
                channel_id: None,
                published_after,
                duration: filters.duration,
            }],
            VideoSource::Channels(ids) => ids
                .into_iter()
                .map(|channel_id| SearchQuery {
                    keyword: None,
                    channel_id: Some(channel_id),
                    published_after,
                    duration: filters.duration,
                })
                .collect(),
        };

        let mut pool = CandidatePool::default();
        let mut pages_fetched = 0;
        for query in &queries {
            let (outcome, pages) = self.page_through(query, filters, now, &mut pool, cancel).await?;
            pages_fetched += pages;
            info!(
                "Source {:?} stopped after {pages} page(s): {outcome:?}, {} candidates pooled",
                query.keyword.as_ref().or(query.channel_id.as_ref()),
                pool.candidates.len()
            );
            if outcome == PageOutcome::Sufficient {
                break;
            }
        }

        let selected: Vec<VideoDetail> = if filters.min_views_per_hour > 0.0 {
            quick_pass(&pool.candidates, filters.min_views_per_hour, want, now)
                .into_iter()
                .cloned()
                .collect()
        } else {
            pool.candidates.into_iter().take(want).collect()
        };

        let mut collection = self.enrich(&selected, now, cancel).await?;
        collection.pages_fetched = pages_fetched;
        Ok(collection)
    }

    async fn page_through(
        &self,
        query: &SearchQuery,
        filters: &CollectFilters,
        now: DateTime<Utc>,
        pool: &mut CandidatePool,
        cancel: &CancelToken,
    ) -> Result<(PageOutcome, usize)> {
        let mut cursor: Option<String> = None;
        let mut pages = 0;

        loop {
            cancel.check()?;

            let page = self
                .stages
                .search_page(query, cursor.as_deref(), cancel)
                .await?;
            pages += 1;

            let fresh = pool.fresh_ids(page.video_ids);
            let details = if fresh.is_empty() {
                Vec::new()
            } else {
                self.stages.video_details(&fresh, cancel).await?
            };
            let breached = pool.admit(details, filters.min_views);

            let outcome = next_outcome(
                pool,
                filters,
                now,
                breached,
                page.next_page_token.is_some(),
                pages,
                self.max_pages,
            );
            debug!("Page {pages}: {} fresh ids -> {outcome:?}", fresh.len());

            match outcome {
                PageOutcome::Continue => cursor = page.next_page_token,
                done => return Ok((done, pages)),
            }
        }
    }

    async fn enrich(
        &self,
        selected: &[VideoDetail],
        now: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Collection> {
        let mut channel_ids: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for detail in selected {
            if seen.insert(detail.channel_id.as_str()) {
                channel_ids.push(detail.channel_id.clone());
            }
        }

        let channels = if channel_ids.is_empty() {
            Vec::new()
        } else {
            self.stages.channel_stats(&channel_ids, cancel).await?
        };
        let subscribers: HashMap<&str, Option<u64>> = channels
            .iter()
            .map(|stats| (stats.channel_id.as_str(), stats.subscriber_count))
            .collect();

        let rows = selected
            .iter()
            .enumerate()
            .map(|(idx, detail)| {
                let subscriber_count = subscribers
                    .get(detail.channel_id.as_str())
                    .copied()
                    .flatten();
                to_row(idx + 1, detail, subscriber_count, now)
            })
            .collect();

        Ok(Collection {
            rows,
            channels,
            pages_fetched: 0,
        })
    }
}
