//! Pull-based cursor over the search pages of one source
//!
//! A pager walks pages `1..=max_pages` of one (location, property type)
//! search and yields one batch of normalized listings per page. It is driven
//! by the caller (`next_page().await`), so a job persists each batch before
//! the next page is requested.
//!
//! # States
//!
//! ```text
//! Idle → Fetching(1) → Parsing(1) → Fetching(2) → ... → Done
//! ```
//!
//! A pager is finite and not restartable: once `Done`, it only returns None.

use crate::adapters::{normalize, NewListing, SourceAdapter};
use crate::fetch::{FetchClient, FetchPolicy};
use crate::{FetchError, HarvestError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What one pager scrapes
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeTarget {
    pub location: String,
    pub property_type: String,

    /// Page budget; at most this many pages are fetched
    pub max_pages: u32,

    /// Pause before every page after the first
    pub request_delay: Duration,
}

/// Position of a pager in its page walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerState {
    Idle,
    Fetching(u32),
    Parsing(u32),
    Done,
}

/// Page cursor for one source search
pub struct ListingPager {
    adapter: Arc<dyn SourceAdapter>,
    fetcher: Arc<FetchClient>,
    policy: FetchPolicy,
    target: ScrapeTarget,
    cancel: CancellationToken,
    state: PagerState,
    pages_fetched: u32,
}

impl ListingPager {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        fetcher: Arc<FetchClient>,
        policy: FetchPolicy,
        target: ScrapeTarget,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            fetcher,
            policy,
            target,
            cancel,
            state: PagerState::Idle,
            pages_fetched: 0,
        }
    }

    pub fn state(&self) -> PagerState {
        self.state
    }

    /// Number of pages fetched so far
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Fetches and parses the next page
    ///
    /// # Returns
    ///
    /// * `Some(Ok(listings))` - One page of listings (possibly empty after filtering bad candidates)
    /// * `Some(Err(HarvestError::Cancelled))` - Cancellation was observed; the pager is done
    /// * `Some(Err(_))` - The fetch failed; the pager is done
    /// * `None` - The page budget is spent or a page had no listings
    pub async fn next_page(&mut self) -> Option<Result<Vec<NewListing>, HarvestError>> {
        let page = match self.state {
            PagerState::Idle => 1,
            PagerState::Parsing(previous) => previous + 1,
            PagerState::Fetching(current) => current,
            PagerState::Done => return None,
        };

        if page > self.target.max_pages {
            self.state = PagerState::Done;
            return None;
        }

        if self.cancel.is_cancelled() {
            self.state = PagerState::Done;
            return Some(Err(HarvestError::Cancelled));
        }

        if page > 1 && !self.target.request_delay.is_zero() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.state = PagerState::Done;
                    return Some(Err(HarvestError::Cancelled));
                }
                _ = tokio::time::sleep(self.target.request_delay) => {}
            }
        }

        self.state = PagerState::Fetching(page);
        let url = self
            .adapter
            .search_url(&self.target.location, &self.target.property_type, page);

        let content = match self.fetcher.fetch(&url, &self.policy, &self.cancel).await {
            Ok(content) => content,
            Err(FetchError::Cancelled { .. }) => {
                self.state = PagerState::Done;
                return Some(Err(HarvestError::Cancelled));
            }
            Err(e) => {
                self.state = PagerState::Done;
                return Some(Err(e.into()));
            }
        };
        self.pages_fetched += 1;

        self.state = PagerState::Parsing(page);
        let candidates = self.adapter.parse_page(&content.body, &content.final_url);

        if candidates.is_empty() {
            debug!(
                source = self.adapter.name(),
                url = %url,
                page,
                "No listings on page, stopping"
            );
            self.state = PagerState::Done;
            return None;
        }

        let found = candidates.len();
        let listings: Vec<NewListing> = candidates
            .into_iter()
            .filter_map(|candidate| match candidate {
                Ok(candidate) => Some(normalize(
                    candidate,
                    self.adapter.name(),
                    &self.target.location,
                    &self.target.property_type,
                    page,
                )),
                Err(e) => {
                    warn!(source = self.adapter.name(), url = %url, page, error = %e, "Skipping listing");
                    None
                }
            })
            .collect();

        debug!(
            source = self.adapter.name(),
            page,
            found,
            kept = listings.len(),
            "Parsed page"
        );

        Some(Ok(listings))
    }
}

impl std::fmt::Debug for ListingPager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingPager")
            .field("source", &self.adapter.name())
            .field("target", &self.target)
            .field("state", &self.state)
            .finish()
    }
}
