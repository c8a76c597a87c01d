//! Fixed-size page fetching and the pull-based page iterator.

use std::sync::Arc;

use futures::future::FutureExt;

use crate::error::Result;
use crate::models::{Page, Viewer};
use crate::pipeline::PipelineContext;
use crate::pipeline::cache::{CacheKey, PageCache, PageKey};
use crate::pipeline::predicate::Predicate;
use crate::storage::{EventQuery, EventStore, RawPage};
use crate::utils::Clock;

/// Fetches single pages through the shared cache.
#[derive(Clone)]
pub struct PageFetcher {
    store: Arc<dyn EventStore>,
    cache: Arc<PageCache>,
    clock: Arc<dyn Clock>,
    page_size: u32,
}

impl PageFetcher {
    pub fn new(ctx: &PipelineContext) -> Self {
        Self {
            store: Arc::clone(&ctx.store),
            cache: Arc::clone(&ctx.cache),
            clock: Arc::clone(&ctx.clock),
            page_size: ctx.discovery.page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch page `page_index`, covering rows
    /// `[page_index * size, page_index * size + size - 1]`.
    ///
    /// "Now" is read when the page is actually issued, so a cached page
    /// keeps the instant it was fetched at while new pages move forward.
    pub async fn fetch_page(
        &self,
        viewer: &Viewer,
        predicate: &Predicate,
        page_index: u32,
    ) -> Result<Page> {
        let key = PageKey {
            query: CacheKey::new(predicate, viewer),
            index: page_index,
        };

        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let page_size = self.page_size;
        let predicate = predicate.clone();
        let viewer = viewer.clone();

        self.cache
            .get_or_fetch(key, move || {
                async move {
                    // Only students carry tracking marks.
                    let viewer_id = match &viewer {
                        Viewer::Student { id, .. } => Some(id),
                        Viewer::Guest { .. } => None,
                    };
                    let query = EventQuery {
                        predicate: &predicate,
                        viewer: viewer_id,
                        offset: u64::from(page_index) * u64::from(page_size),
                        limit: page_size,
                        now: clock.now(),
                    };
                    log::debug!(
                        "Fetching page {} ({} rows from {})",
                        page_index,
                        page_size,
                        query.offset
                    );
                    let raw = store.query_events(&query).await.map_err(|e| e.envelope())?;
                    Ok(assemble_page(page_index, page_size, raw))
                }
                .boxed()
            })
            .await
    }
}

/// Build a page, never longer than `page_size`. The cursor is absent once
/// a short page comes back.
fn assemble_page(index: u32, page_size: u32, raw: RawPage) -> Page {
    let mut events = raw.events;
    events.truncate(page_size as usize);
    let next_cursor = if events.len() < page_size as usize {
        None
    } else {
        index.checked_add(1)
    };
    Page {
        index,
        events,
        total: raw.total,
        next_cursor,
    }
}

/// Result of pulling the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStep {
    Page(Page),
    Exhausted,
}

/// Pull-based iterator over the pages of one predicate.
///
/// Cloning yields an independent cursor over the same query.
#[derive(Clone)]
pub struct Paginator {
    fetcher: PageFetcher,
    viewer: Viewer,
    predicate: Predicate,
    cursor: Option<u32>,
}

impl Paginator {
    pub fn new(fetcher: PageFetcher, viewer: Viewer, predicate: Predicate) -> Self {
        Self {
            fetcher,
            viewer,
            predicate,
            cursor: Some(0),
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Cache entry this paginator reads through.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.predicate, &self.viewer)
    }

    /// Index of the page `next_page` would fetch.
    pub fn cursor(&self) -> Option<u32> {
        self.cursor
    }

    /// Fetch the next page. A failed fetch leaves the cursor in place so
    /// calling again retries the same page.
    pub async fn next_page(&mut self) -> Result<PageStep> {
        let Some(index) = self.cursor else {
            return Ok(PageStep::Exhausted);
        };
        let page = self
            .fetcher
            .fetch_page(&self.viewer, &self.predicate, index)
            .await?;
        self.cursor = page.next_cursor;
        Ok(PageStep::Page(page))
    }
}
