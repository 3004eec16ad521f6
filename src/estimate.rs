use serde_json::Value;

use crate::normalize::RawMeta;
use crate::page::{PageMeta, StatusCounts};

/// Compute best-effort pagination metadata for one returned page.
///
/// Server-reported `total` + `totalPages` are trusted verbatim. When the
/// server omits either, totals are estimated from the one thing we can
/// observe: how full the returned page was.
///
/// Known limitation: a full page only *suggests* more data follows. When
/// the true total is an exact multiple of the page size, the last real
/// page comes back full and is reported as "possibly not last" until the
/// empty next page is observed. Callers must treat estimated totals as
/// lower bounds (`server_reported_totals == false`).
pub fn estimate(
    requested_page: u32,
    requested_limit: u32,
    items_returned: usize,
    raw: &RawMeta,
) -> PageMeta {
    if let (Some(total), Some(total_pages)) = (raw.total, raw.total_pages) {
        return PageMeta {
            total,
            page: raw.page.unwrap_or(requested_page),
            limit: requested_limit,
            total_pages: total_pages.max(1),
            server_reported_totals: true,
        };
    }

    let page = u64::from(requested_page);
    let limit = u64::from(requested_limit);
    let returned = items_returned as u64;
    let has_more_pages = returned >= limit;

    let (total, total_pages) = if has_more_pages {
        (page * limit, requested_page.saturating_add(1))
    } else {
        ((page.saturating_sub(1)) * limit + returned, requested_page.max(1))
    };

    PageMeta {
        total,
        page: requested_page,
        limit: requested_limit,
        total_pages,
        server_reported_totals: false,
    }
}

/// Derive pagination over a client-side filtered collection.
///
/// `ceil(0 / limit)` is treated as 1: an empty collection is one empty
/// page, not zero pages.
pub fn pages_for_total(total: u64, limit: u32) -> u32 {
    let limit = u64::from(limit.max(1));
    let pages = total.div_ceil(limit).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Slice one page out of a fully collected, already filtered collection.
///
/// Pages are 1-based; `page == 0` is treated as page 1.
pub fn slice_page(filtered: &[Value], page: u32, limit: u32) -> Vec<Value> {
    let start = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
    let end = start.saturating_add(limit as usize);
    filtered
        .get(start..end.min(filtered.len()))
        .unwrap_or(&[])
        .to_vec()
}

/// Client-side status-count aggregation over a full collection walk.
///
/// Items missing the status field contribute to `total` only. A
/// server-computed `counts` object, when present, is authoritative and
/// must be preferred over this.
pub fn aggregate_counts(items: &[Value], status_field: &str) -> StatusCounts {
    let mut counts = StatusCounts::new();
    counts.set(StatusCounts::TOTAL_KEY, items.len() as u64);
    for item in items {
        let key = match item.get(status_field) {
            Some(Value::String(s)) => Some(s.to_ascii_lowercase()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        };
        if let Some(key) = key {
            let next = counts.get(&key).unwrap_or(0) + 1;
            counts.set(key, next);
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn no_meta() -> RawMeta {
        RawMeta::default()
    }

    #[test]
    fn test_server_totals_trusted_verbatim() {
        let raw = RawMeta {
            total: Some(5),
            page: Some(1),
            limit: Some(25),
            total_pages: Some(1),
            counts: None,
        };
        // items_returned deliberately inconsistent with the reported total
        let meta = estimate(1, 25, 25, &raw);
        assert_eq!(meta.total, 5);
        assert_eq!(meta.total_pages, 1);
        assert!(meta.server_reported_totals);
    }

    #[test]
    fn test_partial_server_meta_is_not_trusted() {
        let raw = RawMeta {
            total: Some(5),
            ..RawMeta::default()
        };
        let meta = estimate(1, 25, 5, &raw);
        assert!(!meta.server_reported_totals);
        assert_eq!(meta.total, 5);
    }

    #[test]
    fn test_full_page_implies_another_page() {
        let meta = estimate(2, 25, 25, &no_meta());
        assert_eq!(meta.total, 50);
        assert_eq!(meta.total_pages, 3);
        assert!(!meta.server_reported_totals);
    }

    #[test]
    fn test_short_page_is_last_page() {
        let meta = estimate(3, 25, 10, &no_meta());
        assert_eq!(meta.total, 60);
        assert_eq!(meta.total_pages, 3);
    }

    #[test]
    fn test_empty_first_page_is_valid_empty_collection() {
        let meta = estimate(1, 25, 0, &no_meta());
        assert_eq!(meta.total, 0);
        assert_eq!(meta.page, 1);
        assert_eq!(meta.total_pages, 1);
    }

    // The documented boundary limitation: a last page that happens to be
    // exactly full still reports one more page than truly exists.
    #[test]
    fn test_exact_multiple_overestimates_by_one_page() {
        let meta = estimate(2, 25, 25, &no_meta());
        assert_eq!(meta.total_pages, 3);
        let follow_up = estimate(3, 25, 0, &no_meta());
        assert_eq!(follow_up.total, 50);
        assert_eq!(follow_up.total_pages, 3);
    }

    #[test]
    fn test_pages_for_total() {
        assert_eq!(pages_for_total(0, 25), 1);
        assert_eq!(pages_for_total(1, 25), 1);
        assert_eq!(pages_for_total(25, 25), 1);
        assert_eq!(pages_for_total(26, 25), 2);
        assert_eq!(pages_for_total(30, 25), 2);
    }

    #[test]
    fn test_slice_page_past_end_is_empty() {
        let items: Vec<Value> = (0..5).map(|i| json!(i)).collect();
        assert!(slice_page(&items, 3, 25).is_empty());
        assert_eq!(slice_page(&items, 1, 25).len(), 5);
    }

    #[test]
    fn test_slice_page_zero_is_treated_as_first_page() {
        let items: Vec<Value> = (0..5).map(|i| json!(i)).collect();
        assert_eq!(slice_page(&items, 0, 25), slice_page(&items, 1, 25));
    }

    #[test]
    fn test_aggregate_counts() {
        let items = vec![
            json!({"status": "Pending"}),
            json!({"status": "pending"}),
            json!({"status": "approved"}),
            json!({"note": "no status field"}),
        ];
        let counts = aggregate_counts(&items, "status");
        assert_eq!(counts.total(), Some(4));
        assert_eq!(counts.get("pending"), Some(2));
        assert_eq!(counts.get("approved"), Some(1));
    }

    proptest! {
        #[test]
        fn prop_estimator_monotonicity(page in 1u32..1000, limit in 1u32..500, returned in 0usize..500) {
            let returned = returned.min(limit as usize);
            let meta = estimate(page, limit, returned, &no_meta());
            if returned == limit as usize {
                prop_assert_eq!(meta.total_pages, page + 1);
            } else {
                prop_assert_eq!(meta.total_pages, page);
            }
            prop_assert!(meta.page <= meta.total_pages);
        }

        #[test]
        fn prop_server_totals_idempotent(
            page in 1u32..1000,
            limit in 1u32..500,
            returned in 0usize..500,
            total in 0u64..100_000,
            total_pages in 1u32..10_000,
        ) {
            let raw = RawMeta {
                total: Some(total),
                page: Some(page),
                limit: Some(limit),
                total_pages: Some(total_pages),
                counts: None,
            };
            let meta = estimate(page, limit, returned, &raw);
            prop_assert_eq!(meta.total, total);
            prop_assert_eq!(meta.total_pages, total_pages);
            prop_assert!(meta.server_reported_totals);
        }

        #[test]
        fn prop_slice_matches_index_arithmetic(len in 0usize..300, page in 1u32..20, limit in 1u32..50) {
            let all: Vec<Value> = (0..len).map(|i| json!(i)).collect();
            let slice = slice_page(&all, page, limit);

            let start = (page as usize - 1) * limit as usize;
            let end = (start + limit as usize).min(len);
            let expected: Vec<Value> = if start < len { all[start..end].to_vec() } else { Vec::new() };

            prop_assert_eq!(&slice, &expected);
            prop_assert!(slice.len() <= limit as usize);
            prop_assert_eq!(pages_for_total(len as u64, limit), ((len as u64).div_ceil(limit as u64)).max(1) as u32);
        }
    }
}
