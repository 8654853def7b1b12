use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{InFlight, LoadOutcome};
use crate::cache::CacheStamp;
use crate::config::LoaderSettings;
use crate::model::{Call, FilterCriteria};
use crate::retell::{ListCallsRequest, RetellService, SortOrder};
use crate::webhook::{WebhookCallsRequest, WebhookService};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallPage {
    pub calls: Vec<Call>,
    /// Records the source sent, including ones dropped as malformed.
    pub received: usize,
    pub next_cursor: Option<String>,
    pub total_pages: Option<u32>,
    pub total_calls: Option<u64>,
    /// The source knows there is nothing after this page.
    pub exhausted: bool,
}

impl CallPage {
    /// Size of the page as sent, so dropped records don't make it look short.
    pub fn len(&self) -> usize {
        self.received.max(self.calls.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One page of calls from whichever listing endpoint backs the session.
#[async_trait]
pub trait CallPager: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<CallPage>;
}

/// Cursor-paged listing on the platform API.
pub struct RetellPager {
    api: Arc<dyn RetellService>,
    filter: FilterCriteria,
}

impl RetellPager {
    pub fn new(api: Arc<dyn RetellService>, filter: FilterCriteria) -> Self {
        Self { api, filter }
    }
}

#[async_trait]
impl CallPager for RetellPager {
    async fn fetch_page(&self, request: &PageRequest) -> Result<CallPage> {
        let res = self
            .api
            .list_calls(&ListCallsRequest {
                limit: request.page_size,
                pagination_key: request.cursor.clone(),
                sort_order: SortOrder::Descending,
                filter_criteria: self.filter.clone(),
            })
            .await?;
        Ok(CallPage {
            exhausted: res.pagination_key.is_none(),
            next_cursor: res.pagination_key,
            calls: res.calls,
            received: res.received,
            total_pages: None,
            total_calls: None,
        })
    }
}

/// Page-numbered listing on the tenant calls webhook.
pub struct WebhookPager {
    hooks: Arc<dyn WebhookService>,
    client_id: String,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl WebhookPager {
    pub fn new(
        hooks: Arc<dyn WebhookService>,
        client_id: String,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Self {
        Self {
            hooks,
            client_id,
            from,
            to,
        }
    }
}

#[async_trait]
impl CallPager for WebhookPager {
    async fn fetch_page(&self, request: &PageRequest) -> Result<CallPage> {
        let page = self
            .hooks
            .list_calls_page(&WebhookCallsRequest {
                per_page: request.page_size,
                page: request.page,
                client_id: self.client_id.clone(),
                fecha_inicio: self.from,
                fecha_fin: self.to,
            })
            .await?;
        Ok(CallPage {
            calls: page.calls,
            received: page.received,
            next_cursor: None,
            total_pages: page.total_pages,
            total_calls: page.total_calls,
            exhausted: false,
        })
    }
}

/// Accumulates calls keeping the first occurrence of every id.
#[derive(Debug, Default)]
struct UniqueCalls {
    calls: Vec<Call>,
    seen: HashSet<String>,
}

impl UniqueCalls {
    fn from_existing(calls: &[Call]) -> Self {
        let mut out = Self::default();
        out.extend(calls.iter().cloned());
        out
    }

    /// Returns how many calls were new.
    fn extend(&mut self, incoming: impl IntoIterator<Item = Call>) -> usize {
        let before = self.calls.len();
        for call in incoming {
            if self.seen.insert(call.call_id.clone()) {
                self.calls.push(call);
            }
        }
        self.calls.len() - before
    }

    fn len(&self) -> usize {
        self.calls.len()
    }
}

/// Sorted distinct non-empty disconnection reasons.
pub fn disconnection_reasons(calls: &[Call]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|c| c.disconnection_reason.as_deref())
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Default)]
struct CallState {
    calls: Arc<Vec<Call>>,
    progress: usize,
    error: Option<String>,
    disconnection_reasons: Vec<String>,
    fully_loaded: bool,
    stamp: CacheStamp,
    current_page: u32,
    total_pages: Option<u32>,
    has_more_pages: bool,
    next_cursor: Option<String>,
    server_total: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct CallSnapshot {
    pub calls: Arc<Vec<Call>>,
    /// Records accumulated so far by the running (or last) load.
    pub progress: usize,
    pub error: Option<String>,
    pub total: usize,
    pub disconnection_reasons: Vec<String>,
    pub fully_loaded: bool,
    pub loading: bool,
    pub last_updated: Option<Instant>,
    pub current_page: u32,
    pub total_pages: Option<u32>,
    pub has_more_pages: bool,
    /// Total reported by the server, when the source reports one.
    pub server_total: Option<u64>,
}

pub struct CallLoader {
    settings: LoaderSettings,
    state: RwLock<CallState>,
    loading: AtomicBool,
}

impl CallLoader {
    pub fn new(settings: LoaderSettings) -> Self {
        Self {
            settings,
            state: RwLock::new(CallState::default()),
            loading: AtomicBool::new(false),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub async fn snapshot(&self) -> CallSnapshot {
        let state = self.state.read().await;
        CallSnapshot {
            calls: Arc::clone(&state.calls),
            progress: state.progress,
            error: state.error.clone(),
            total: state.calls.len(),
            disconnection_reasons: state.disconnection_reasons.clone(),
            fully_loaded: state.fully_loaded,
            loading: self.is_loading(),
            last_updated: state.stamp.updated_at(),
            current_page: state.current_page,
            total_pages: state.total_pages,
            has_more_pages: state.has_more_pages,
            server_total: state.server_total,
        }
    }

    pub async fn set_error(&self, message: impl Into<String>) {
        self.state.write().await.error = Some(message.into());
    }

    /// Drops everything, e.g. when the session switches tenant.
    pub async fn reset(&self) {
        *self.state.write().await = CallState::default();
    }

    fn is_last_page(&self, page: u32, fetched: &CallPage, total_pages: Option<u32>) -> bool {
        fetched.exhausted
            || fetched.len() < self.settings.page_size as usize
            || total_pages.is_some_and(|total| page >= total)
    }

    /// Walks every page from the start. Within the cache window a non-forced
    /// call is a no-op.
    #[instrument(skip_all, fields(force = force))]
    pub async fn load_all(&self, pager: &dyn CallPager, force: bool) -> LoadOutcome {
        let ttl = self.settings.cache_ttl;
        {
            let state = self.state.read().await;
            if !force && !state.calls.is_empty() && state.stamp.is_fresh(ttl) {
                debug!(count = state.calls.len(), "using cached calls");
                return LoadOutcome::Cached;
            }
        }

        let Some(_in_flight) = InFlight::try_acquire(&self.loading) else {
            debug!("calls are already loading");
            return LoadOutcome::AlreadyLoading;
        };

        {
            let mut state = self.state.write().await;
            state.progress = 0;
            if force || !state.stamp.is_fresh(ttl) {
                state.calls = Arc::new(Vec::new());
                state.error = None;
            }
        }

        let page_size = self.settings.page_size;
        let mut acc = UniqueCalls::default();
        let mut cursor: Option<String> = None;
        let mut page: u32 = 1;
        let mut pages_loaded: u32 = 0;
        let mut requests: u32 = 0;
        let mut failures: u32 = 0;
        let mut total_pages: Option<u32> = None;
        let mut server_total: Option<u64> = None;
        let mut last_error: Option<String> = None;
        let mut completed = false;

        while requests < self.settings.max_page_requests {
            requests += 1;
            let request = PageRequest {
                page,
                page_size,
                cursor: cursor.clone(),
            };
            debug!(page, cursor = ?request.cursor, "requesting call page");

            match pager.fetch_page(&request).await {
                Ok(fetched) => {
                    failures = 0;
                    total_pages = fetched.total_pages.or(total_pages);
                    server_total = fetched.total_calls.or(server_total);
                    let received = fetched.len();
                    let last = self.is_last_page(page, &fetched, total_pages);
                    let next_cursor = fetched.next_cursor.clone();
                    let added = acc.extend(fetched.calls);
                    pages_loaded = page;
                    info!(page, received, added, accumulated = acc.len(), "loaded call page");
                    self.state.write().await.progress = acc.len();

                    if last {
                        completed = true;
                        break;
                    }
                    cursor = next_cursor;
                    page += 1;
                }
                Err(err) => {
                    failures += 1;
                    let message = format!("failed to load page {}: {:#}", page, err);
                    warn!(page, failures, error = %format!("{:#}", err), "call page failed");
                    self.state.write().await.error = Some(message.clone());
                    last_error = Some(message);
                    if failures >= self.settings.page_failure_limit {
                        warn!(failures, "too many consecutive failures; stopping call load");
                        break;
                    }
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
            }
        }

        let aborted = failures >= self.settings.page_failure_limit;
        let error = if completed {
            None
        } else if aborted {
            last_error
        } else {
            let message = format!(
                "reached the limit of {} page requests; some calls may be missing",
                self.settings.max_page_requests
            );
            warn!("{}", message);
            Some(message)
        };

        let calls = acc.calls;
        let count = calls.len();
        let mut state = self.state.write().await;
        state.disconnection_reasons = disconnection_reasons(&calls);
        state.calls = Arc::new(calls);
        state.progress = count;
        state.fully_loaded = completed;
        state.stamp.touch();
        state.current_page = pages_loaded;
        state.total_pages = total_pages;
        state.has_more_pages = !completed;
        state.next_cursor = cursor;
        state.server_total = server_total;
        state.error = error.clone();
        info!(count, completed, "call load finished");

        match error {
            None => LoadOutcome::Loaded { count },
            Some(error) => LoadOutcome::Partial { count, error },
        }
    }

    /// Fetches only the page after the last one loaded and merges it in.
    #[instrument(skip_all)]
    pub async fn load_next_page(&self, pager: &dyn CallPager) -> LoadOutcome {
        let Some(_in_flight) = InFlight::try_acquire(&self.loading) else {
            return LoadOutcome::AlreadyLoading;
        };

        let (page, cursor) = {
            let state = self.state.read().await;
            if state.current_page > 0 && !state.has_more_pages {
                return LoadOutcome::NoMorePages;
            }
            (state.current_page + 1, state.next_cursor.clone())
        };
        let request = PageRequest {
            page,
            page_size: self.settings.page_size,
            cursor,
        };

        let fetched = match pager.fetch_page(&request).await {
            Ok(fetched) => fetched,
            Err(err) => {
                let error = format!("failed to load page {}: {:#}", page, err);
                warn!(page, "{}", error);
                self.state.write().await.error = Some(error.clone());
                return LoadOutcome::Failed { error };
            }
        };

        let mut state = self.state.write().await;
        let total_pages = fetched.total_pages.or(state.total_pages);
        let received = fetched.len();
        let last = self.is_last_page(page, &fetched, total_pages);
        let mut acc = UniqueCalls::from_existing(&state.calls);
        let added = acc.extend(fetched.calls);

        state.disconnection_reasons = disconnection_reasons(&acc.calls);
        state.progress = acc.len();
        state.calls = Arc::new(acc.calls);
        state.current_page = page;
        state.total_pages = total_pages;
        state.server_total = fetched.total_calls.or(state.server_total);
        state.has_more_pages = !last;
        state.fully_loaded = last;
        state.next_cursor = fetched.next_cursor;
        state.error = None;
        state.stamp.touch();
        info!(page, received, added, "loaded next call page");

        LoadOutcome::Loaded { count: added }
    }
}
