use serde_json::{Map, Value};
use tracing::warn;

use crate::page::StatusCounts;

/// Pagination metadata as actually found in a response, before estimation
/// fills in the gaps. Every field is optional because no backend shape
/// guarantees any of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMeta {
    pub total: Option<u64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub total_pages: Option<u32>,
    pub counts: Option<StatusCounts>,
}

/// The item array and whatever metadata a response carried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedPage {
    pub items: Vec<Value>,
    pub meta: RawMeta,
}

/// Extract an item array and optional pagination metadata from an
/// arbitrary backend payload.
///
/// Shapes are tried in a fixed precedence so that metadata is not lost
/// when it is present under a less obvious key:
///
/// 1. `{items: [...], ...meta}`
/// 2. `{data: [...], ...meta}`
/// 3. `{results: [...], ...meta}` (no `counts` expected in this shape)
/// 4. a bare array (a full, unpaginated snapshot)
/// 5. `{<entity_key>: [...], ...meta}`
/// 6. the first array-valued property, in document order, with no metadata
/// 7. no array anywhere: an empty-but-valid page
///
/// Never fails: an unrecognized shape degrades to an empty result, because
/// a list screen showing "no records" beats a hard crash on a payload the
/// backend changed under us.
pub fn normalize(raw: &Value, entity_key: Option<&str>, requested_limit: u32) -> NormalizedPage {
    if let Value::Object(object) = raw {
        for key in ["items", "data"] {
            if let Some(Value::Array(items)) = object.get(key) {
                return NormalizedPage {
                    items: items.clone(),
                    meta: meta_from_object(object, true),
                };
            }
        }

        if let Some(Value::Array(items)) = object.get("results") {
            return NormalizedPage {
                items: items.clone(),
                meta: meta_from_object(object, false),
            };
        }
    }

    if let Value::Array(items) = raw {
        return NormalizedPage {
            meta: snapshot_meta(items.len()),
            items: items.clone(),
        };
    }

    if let Value::Object(object) = raw {
        if let Some(key) = entity_key {
            if let Some(Value::Array(items)) = object.get(key) {
                return NormalizedPage {
                    items: items.clone(),
                    meta: meta_from_object(object, true),
                };
            }
        }

        // Last resort: take the first array-valued property and accept
        // that we know nothing about pagination.
        if let Some((key, Value::Array(items))) =
            object.iter().find(|(_, v)| v.is_array())
        {
            warn!(key = %key, "normalize: fell back to generic array property");
            return NormalizedPage {
                items: items.clone(),
                meta: RawMeta::default(),
            };
        }
    }

    warn!("normalize: no item array found in response, degrading to empty page");
    NormalizedPage {
        items: Vec::new(),
        meta: RawMeta {
            total: Some(0),
            page: Some(1),
            limit: Some(requested_limit),
            total_pages: Some(1),
            counts: None,
        },
    }
}

/// A bare array is a complete snapshot: one page holding everything.
fn snapshot_meta(len: usize) -> RawMeta {
    RawMeta {
        total: Some(len as u64),
        page: Some(1),
        limit: Some((len as u32).max(1)),
        total_pages: Some(1),
        counts: None,
    }
}

fn meta_from_object(object: &Map<String, Value>, read_counts: bool) -> RawMeta {
    RawMeta {
        total: object.get("total").and_then(Value::as_u64),
        page: object.get("page").and_then(as_u32),
        limit: object.get("limit").and_then(as_u32),
        total_pages: object.get("totalPages").and_then(as_u32),
        counts: if read_counts {
            object.get("counts").and_then(StatusCounts::from_value)
        } else {
            None
        },
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}
