use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::estimate::{aggregate_counts, estimate, pages_for_total, slice_page};
use crate::normalize::{normalize, NormalizedPage};
use crate::page::{matches_filter, PageMeta, PageRequest, PageResult, StatusCounts};
use crate::transport::{Transport, TransportError};
use crate::ClientConfig;

/// Monotonic stamp for one orchestrator invocation. A result whose token
/// is older than the latest issued token for the list is stale and must
/// be discarded by the consumer (there is no hard network cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchToken(u64);

impl FetchToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Whether the backend honors server-side filtering for one filter field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityVerdict {
    pub filter_field: String,
    pub supported: bool,
}

/// Session-lifetime record of probe verdicts, keyed per filter field.
///
/// Append-only: a verdict, once learned, is never revoked, matching the
/// assumption that backend filter support does not change at runtime.
#[derive(Debug, Default)]
struct ProbeCache {
    verdicts: HashMap<String, bool>,
}

impl ProbeCache {
    fn get(&self, field: &str) -> Option<bool> {
        self.verdicts.get(field).copied()
    }

    fn record(&mut self, field: impl Into<String>, supported: bool) {
        self.verdicts.entry(field.into()).or_insert(supported);
    }
}

/// The outcome of one orchestrated fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Completed {
        token: FetchToken,
        result: PageResult,
    },
    /// Another fetch for the same list was already in flight; this call
    /// was dropped, not queued. The caller re-triggers on its next state
    /// change instead of relying on the dropped call.
    Dropped,
}

impl FetchOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, FetchOutcome::Dropped)
    }

    pub fn into_result(self) -> Option<(FetchToken, PageResult)> {
        match self {
            FetchOutcome::Completed { token, result } => Some((token, result)),
            FetchOutcome::Dropped => None,
        }
    }
}

/// Everything retrieved by a bounded full-collection walk.
#[derive(Debug, Clone)]
pub struct Collection {
    pub items: Vec<Value>,
    pub pages_walked: u32,
    /// The walk hit its safety bound before the last backend page; any
    /// aggregate derived from `items` is a lower bound.
    pub truncated: bool,
}

struct PageWalk {
    items: Vec<Value>,
    pages_walked: u32,
    truncated: bool,
    server_counts: Option<StatusCounts>,
}

/// Clears the in-flight flag when a fetch finishes, including on error.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum CapabilityResolution {
    /// Server-side filtering works. Carries the probe response when the
    /// probe just ran, so a page-1 fetch can reuse it without a second
    /// network call.
    Supported(Option<NormalizedPage>),
    Unsupported,
}

/// The adaptive paginated-collection client for one logical list view.
///
/// Owns the probe cache and fetch-token counter for the lifetime of that
/// view; nothing here is shared across unrelated lists. The client never
/// retries, caches, or mutates UI state — it turns one `PageRequest` into
/// one coherent `PageResult` against a backend whose pagination and
/// filtering contract is not reliably known in advance.
pub struct PagedClient<S: Transport> {
    transport: Arc<S>,
    collection: String,
    entity_key: String,
    status_field: Option<String>,
    config: ClientConfig,
    probe_cache: RwLock<ProbeCache>,
    in_flight: AtomicBool,
    token_counter: AtomicU64,
}

impl<S: Transport> PagedClient<S> {
    pub fn new(transport: Arc<S>, collection: impl Into<String>, config: ClientConfig) -> Self {
        let collection = collection.into();
        Self {
            entity_key: collection.clone(),
            transport,
            collection,
            status_field: None,
            config,
            probe_cache: RwLock::new(ProbeCache::default()),
            in_flight: AtomicBool::new(false),
            token_counter: AtomicU64::new(0),
        }
    }

    /// Override the entity-named array key the normalizer should accept
    /// (defaults to the collection name).
    pub fn with_entity_key(mut self, key: impl Into<String>) -> Self {
        self.entity_key = key.into();
        self
    }

    /// Field used for client-side status-count aggregation on the
    /// fallback path. Without it, only server-supplied counts surface.
    pub fn with_status_field(mut self, field: impl Into<String>) -> Self {
        self.status_field = Some(field.into());
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// True when a newer fetch was started after `token` was issued.
    pub fn is_stale(&self, token: FetchToken) -> bool {
        token.0 < self.token_counter.load(Ordering::SeqCst)
    }

    /// The cached probe verdict for a filter field, if one was learned.
    pub async fn capability(&self, field: &str) -> Option<CapabilityVerdict> {
        self.probe_cache
            .read()
            .await
            .get(field)
            .map(|supported| CapabilityVerdict {
                filter_field: field.to_string(),
                supported,
            })
    }

    /// Fetch one page of the (possibly filtered) collection.
    ///
    /// State machine per active filter field: Unknown fields are probed
    /// once; if every active field is Supported, a single direct request
    /// serves the page; if any is Unsupported, the whole filter set is
    /// applied client-side over a bounded full-collection walk.
    ///
    /// At most one fetch runs per client at a time. A call arriving while
    /// one is in flight returns [`FetchOutcome::Dropped`] immediately.
    /// Transport errors propagate unmodified.
    #[instrument(skip(self, request), fields(collection = %self.collection, page = request.page(), limit = request.limit()))]
    pub async fn fetch(&self, request: &PageRequest) -> Result<FetchOutcome, TransportError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("fetch already in flight for this list, dropping call");
            return Ok(FetchOutcome::Dropped);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let token = FetchToken(self.token_counter.fetch_add(1, Ordering::SeqCst) + 1);
        let request_id = Uuid::new_v4();
        debug!(%request_id, filters = request.filters().len(), "fetch started");

        let result = if request.filters().is_empty() {
            // Nothing to probe when nothing is filtered.
            self.fetch_direct(request).await?
        } else {
            match self.resolve_capability(request).await? {
                CapabilityResolution::Supported(Some(probed)) if request.page() == 1 => {
                    // The probe was this exact request; reuse its response.
                    self.finish_direct(request, probed)
                }
                CapabilityResolution::Supported(_) => self.fetch_direct(request).await?,
                CapabilityResolution::Unsupported => self.fetch_fallback(request).await?,
            }
        };

        debug!(
            %request_id,
            total = result.meta.total,
            total_pages = result.meta.total_pages,
            exact = result.meta.server_reported_totals,
            "fetch completed"
        );
        Ok(FetchOutcome::Completed { token, result })
    }

    /// Retrieve the entire collection (unfiltered) for cross-referencing
    /// screens, bounded by `max_aggregate_pages`.
    ///
    /// Deliberately not guarded by the coalescer: aggregation targets a
    /// different collection than the list the coalescer protects.
    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn collect_all(&self) -> Result<Collection, TransportError> {
        let walk = self.walk_pages(self.config.max_aggregate_pages).await?;
        Ok(Collection {
            items: walk.items,
            pages_walked: walk.pages_walked,
            truncated: walk.truncated,
        })
    }

    /// Probe any filter fields with no cached verdict, then decide
    /// between the direct and fallback paths.
    async fn resolve_capability(
        &self,
        request: &PageRequest,
    ) -> Result<CapabilityResolution, TransportError> {
        let unknown: Vec<(String, String)> = {
            let cache = self.probe_cache.read().await;
            // A field already known Unsupported forces the fallback path;
            // don't spend a probe request on the remaining unknown fields.
            if request
                .filters()
                .fields()
                .any(|field| cache.get(field) == Some(false))
            {
                return Ok(CapabilityResolution::Unsupported);
            }
            request
                .filters()
                .iter()
                .filter(|(field, _)| cache.get(field).is_none())
                .map(|(field, value)| (field.to_string(), value.to_string()))
                .collect()
        };

        let probed = if unknown.is_empty() {
            None
        } else {
            // One page-1 request with the full filter set applied serves
            // as the probe for every unknown field at once.
            let mut query = vec![
                ("page".to_string(), "1".to_string()),
                ("limit".to_string(), request.limit().to_string()),
            ];
            for (field, value) in request.filters().iter() {
                query.push((field.to_string(), value.to_string()));
            }
            let raw = self.transport.get_json(&self.collection, &query).await?;
            let page = normalize(&raw, Some(&self.entity_key), request.limit());

            let mut cache = self.probe_cache.write().await;
            for (field, value) in &unknown {
                let supported = field_supported(&page.items, field, value);
                info!(field = %field, supported, "capability probe verdict");
                cache.record(field.clone(), supported);
            }
            Some(page)
        };

        let cache = self.probe_cache.read().await;
        let all_supported = request
            .filters()
            .fields()
            .all(|field| cache.get(field).unwrap_or(false));

        if all_supported {
            Ok(CapabilityResolution::Supported(probed))
        } else {
            Ok(CapabilityResolution::Unsupported)
        }
    }

    async fn fetch_direct(&self, request: &PageRequest) -> Result<PageResult, TransportError> {
        let raw = self
            .transport
            .get_json(&self.collection, &request.to_query())
            .await?;
        let page = normalize(&raw, Some(&self.entity_key), request.limit());
        Ok(self.finish_direct(request, page))
    }

    fn finish_direct(&self, request: &PageRequest, page: NormalizedPage) -> PageResult {
        let counts = page.meta.counts.clone();
        let returned = page.items.len();
        let limit = request.limit() as usize;

        if returned > limit {
            // The server ignored `limit` (typically a bare-array snapshot
            // of the whole collection). We hold everything, so page it
            // client-side with exact totals.
            let total = returned as u64;
            let items = slice_page(&page.items, request.page(), request.limit());
            return PageResult {
                items,
                meta: PageMeta {
                    total,
                    page: request.page(),
                    limit: request.limit(),
                    total_pages: pages_for_total(total, request.limit()),
                    server_reported_totals: true,
                },
                counts,
                truncated: false,
            };
        }

        let meta = estimate(request.page(), request.limit(), returned, &page.meta);
        PageResult {
            items: page.items,
            meta,
            counts,
            truncated: false,
        }
    }

    /// Client-side re-implementation of filtering: walk every backend
    /// page, filter in memory, re-derive pagination over the filtered
    /// collection. Any mid-walk transport failure fails the whole
    /// fallback — a visibly failed screen beats a silently wrong count.
    async fn fetch_fallback(&self, request: &PageRequest) -> Result<PageResult, TransportError> {
        info!("server-side filtering unsupported, collecting pages client-side");
        let walk = self.walk_pages(self.config.max_fallback_pages).await?;

        let filtered: Vec<Value> = walk
            .items
            .iter()
            .filter(|item| request.filters().matches(item))
            .cloned()
            .collect();

        let total = filtered.len() as u64;
        let counts = walk.server_counts.clone().or_else(|| {
            self.status_field
                .as_deref()
                .map(|field| aggregate_counts(&walk.items, field))
        });

        Ok(PageResult {
            items: slice_page(&filtered, request.page(), request.limit()),
            meta: PageMeta {
                total,
                page: request.page(),
                limit: request.limit(),
                total_pages: pages_for_total(total, request.limit()),
                server_reported_totals: false,
            },
            counts,
            truncated: walk.truncated,
        })
    }

    /// Sequential bounded page walk. Strictly one request at a time to
    /// bound backend load and keep accumulator order deterministic.
    async fn walk_pages(&self, max_pages: u32) -> Result<PageWalk, TransportError> {
        let limit = self.config.fallback_page_size.max(1);
        let mut items: Vec<Value> = Vec::new();
        let mut server_counts: Option<StatusCounts> = None;
        let mut truncated = false;
        let mut page = 1u32;

        loop {
            let query = vec![
                ("page".to_string(), page.to_string()),
                ("limit".to_string(), limit.to_string()),
            ];
            let raw = self.transport.get_json(&self.collection, &query).await?;
            let normalized = normalize(&raw, Some(&self.entity_key), limit);

            if server_counts.is_none() {
                server_counts = normalized.meta.counts.clone();
            }

            let returned = normalized.items.len();
            items.extend(normalized.items);

            if returned == 0 {
                break;
            }
            match normalized.meta.total_pages {
                // Server-reported page count is authoritative; it also
                // covers backends that cap the page size below what we
                // asked for, where a "short" page is not the last one.
                Some(total_pages) => {
                    if page >= total_pages {
                        break;
                    }
                }
                // No metadata: a page shorter than requested is the last.
                None => {
                    if returned < limit as usize {
                        break;
                    }
                }
            }
            if page >= max_pages {
                truncated = true;
                warn!(
                    max_pages,
                    collected = items.len(),
                    "page walk truncated at safety bound; derived counts undercount"
                );
                break;
            }
            page += 1;
        }

        debug!(pages_walked = page, collected = items.len(), "page walk finished");
        Ok(PageWalk {
            items,
            pages_walked: page,
            truncated,
            server_counts,
        })
    }
}

/// Probe verdict for a single field against a probe response.
///
/// An empty page is inconclusive-but-accepted: a filter can legitimately
/// match nothing, and assuming support avoids a full-collection scan on
/// every zero-result filter.
fn field_supported(items: &[Value], field: &str, value: &str) -> bool {
    items.is_empty() || items.iter().all(|item| matches_filter(item, field, value))
}
