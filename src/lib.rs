//! Shared list-fetching core for admin dashboard screens.
//!
//! Every list screen (inventories, requests, logs, records) talks to a
//! REST backend whose pagination/filtering/count contract is not reliably
//! known in advance. This crate owns the one algorithm they all share:
//! detect whether the server honors a filter, fetch a page window (or
//! fall back to collecting and filtering client-side), and always hand
//! the UI a page-accurate [`PageResult`].

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod estimate;
pub mod normalize;
pub mod page;
pub mod transport;

pub use client::{CapabilityVerdict, Collection, FetchOutcome, FetchToken, PagedClient};
pub use normalize::{normalize, NormalizedPage, RawMeta};
pub use page::{
    matches_filter, FilterSet, PageError, PageMeta, PageRequest, PageResult, StatusCounts,
};
pub use transport::{encode_query, Transport, TransportError};

/// Page size shared by every list screen unless a caller overrides it.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Safety bound on the fallback full-collection page walk.
pub const MAX_FALLBACK_PAGES: u32 = 100;

/// Smaller safety bound for cross-referencing aggregations that need a
/// whole (unrelated) collection.
pub const MAX_AGGREGATE_PAGES: u32 = 50;

/// Page size the fallback walker asks for. Larger than the display page
/// size so full-collection walks need fewer round trips.
pub const FALLBACK_PAGE_SIZE: u32 = 100;

/// Tuning knobs for one [`PagedClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub default_page_size: u32,
    pub max_fallback_pages: u32,
    pub max_aggregate_pages: u32,
    pub fallback_page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_fallback_pages: MAX_FALLBACK_PAGES,
            max_aggregate_pages: MAX_AGGREGATE_PAGES,
            fallback_page_size: FALLBACK_PAGE_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn with_default_page_size(mut self, limit: u32) -> Self {
        self.default_page_size = limit.max(1);
        self
    }

    pub fn with_max_fallback_pages(mut self, pages: u32) -> Self {
        self.max_fallback_pages = pages.max(1);
        self
    }

    pub fn with_max_aggregate_pages(mut self, pages: u32) -> Self {
        self.max_aggregate_pages = pages.max(1);
        self
    }

    pub fn with_fallback_page_size(mut self, limit: u32) -> Self {
        self.fallback_page_size = limit.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.default_page_size, 25);
        assert_eq!(config.max_fallback_pages, 100);
        assert_eq!(config.max_aggregate_pages, 50);
        assert_eq!(config.fallback_page_size, 100);
    }

    #[test]
    fn test_builder_clamps_to_minimum() {
        let config = ClientConfig::default()
            .with_default_page_size(0)
            .with_max_fallback_pages(0);
        assert_eq!(config.default_page_size, 1);
        assert_eq!(config.max_fallback_pages, 1);
    }
}
