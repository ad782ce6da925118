//! Assembles complete collections out of bounded pages.
//!
//! The offset advances by the number of items actually returned, so short
//! pages are tolerated. A change in the reported total between pages means
//! the listing moved underneath us: the pass is restarted from offset 0 a
//! bounded number of times, after which the collection is returned flagged
//! as unstable.

use std::collections::HashSet;
use std::future::Future;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{Keyed, Page};
use crate::retry::RetryPolicy;

/// Enough pages for this many items before pagination is considered runaway.
pub const DEFAULT_MAX_ITEMS: usize = 100_000;
pub const DEFAULT_MAX_RESTARTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dedup {
    /// Keep repeated items (playlists may hold a track twice).
    Keep,
    /// Drop items whose key was already collected.
    ByKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    pub items: Vec<T>,
    /// Last total reported by the remote, if any.
    pub total: Option<usize>,
    pub pages: usize,
    pub restarts: u32,
    /// False when the listing kept changing across every restart.
    pub stable: bool,
}

impl<T> Collection<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: None,
            pages: 0,
            restarts: 0,
            stable: true,
        }
    }
}

struct Pass<T> {
    items: Vec<T>,
    total: Option<usize>,
    pages: usize,
    drifted: bool,
}

#[derive(Debug, Clone)]
pub struct Pager {
    page_size: usize,
    max_items: usize,
    max_restarts: u32,
    retry: RetryPolicy,
}

impl Pager {
    pub fn new(page_size: usize, retry: RetryPolicy) -> Self {
        Self {
            page_size: page_size.max(1),
            max_items: DEFAULT_MAX_ITEMS,
            max_restarts: DEFAULT_MAX_RESTARTS,
            retry,
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn max_pages(&self) -> usize {
        self.max_items.div_ceil(self.page_size).max(1)
    }

    /// Every item of the listing, in remote order.
    pub async fn collect_all<T, F, Fut>(
        &self,
        what: &str,
        dedup: Dedup,
        fetch: F,
    ) -> Result<Collection<T>>
    where
        T: Keyed,
        F: FnMut(usize, usize) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        self.collect(what, dedup, None, fetch).await
    }

    /// The first `max_items` items of the listing, in remote order.
    pub async fn collect_up_to<T, F, Fut>(
        &self,
        what: &str,
        dedup: Dedup,
        max_items: usize,
        fetch: F,
    ) -> Result<Collection<T>>
    where
        T: Keyed,
        F: FnMut(usize, usize) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        if max_items == 0 {
            return Ok(Collection::empty());
        }
        self.collect(what, dedup, Some(max_items), fetch).await
    }

    async fn collect<T, F, Fut>(
        &self,
        what: &str,
        dedup: Dedup,
        cap: Option<usize>,
        mut fetch: F,
    ) -> Result<Collection<T>>
    where
        T: Keyed,
        F: FnMut(usize, usize) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        let mut restarts = 0;
        loop {
            let last_pass = restarts >= self.max_restarts;
            let pass = self.pass(what, dedup, cap, &mut fetch, last_pass).await?;
            if !pass.drifted || last_pass {
                if pass.drifted {
                    warn!(
                        "Pager: {} kept changing across {} restart(s); returning {} item(s) as unstable",
                        what,
                        restarts,
                        pass.items.len()
                    );
                } else {
                    debug!(
                        "Pager: collected {} item(s) of {} in {} page(s)",
                        pass.items.len(),
                        what,
                        pass.pages
                    );
                }
                return Ok(Collection {
                    items: pass.items,
                    total: pass.total,
                    pages: pass.pages,
                    restarts,
                    stable: !pass.drifted,
                });
            }
            restarts += 1;
            warn!(
                "Pager: {} changed while paging, restarting ({}/{})",
                what, restarts, self.max_restarts
            );
        }
    }

    async fn pass<T, F, Fut>(
        &self,
        what: &str,
        dedup: Dedup,
        cap: Option<usize>,
        fetch: &mut F,
        finish_on_drift: bool,
    ) -> Result<Pass<T>>
    where
        T: Keyed,
        F: FnMut(usize, usize) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        let max_pages = self.max_pages();
        let mut items: Vec<T> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut offset = 0;
        let mut pages = 0;
        let mut first_total: Option<usize> = None;
        let mut last_total: Option<usize> = None;
        let mut drifted = false;

        loop {
            if pages >= max_pages {
                warn!(
                    "Pager: {} still reports more items after {} pages, giving up",
                    what, pages
                );
                return Err(Error::PaginationExhausted { pages });
            }

            let want = match cap {
                Some(cap) => (cap - items.len()).min(self.page_size),
                None => self.page_size,
            };
            let label = format!("{} page at offset {}", what, offset);
            let page = self.retry.run(&label, || fetch(offset, want)).await?;
            pages += 1;

            if let Some(total) = page.total {
                match first_total {
                    None => first_total = Some(total),
                    Some(first) if first != total => drifted = true,
                    Some(_) => {}
                }
                last_total = Some(total);
            }
            if drifted && !finish_on_drift {
                return Ok(Pass {
                    items,
                    total: last_total,
                    pages,
                    drifted,
                });
            }

            let returned = page.items.len();
            let has_more = page.has_more;
            if returned == 0 {
                break;
            }
            offset += returned;

            for item in page.items {
                if dedup == Dedup::ByKey && !seen.insert(item.key().to_string()) {
                    debug!("Pager: dropping repeated item {} in {}", item.key(), what);
                    continue;
                }
                items.push(item);
            }

            if let Some(cap) = cap {
                if items.len() >= cap {
                    items.truncate(cap);
                    break;
                }
            }
            if !has_more {
                break;
            }
        }

        Ok(Pass {
            items,
            total: last_total,
            pages,
            drifted,
        })
    }
}
