//! Configuration constants for the query runner
//!
//! This module centralizes the connection defaults, driver timeouts and the
//! parameters of the operation catalog.

use std::time::Duration;

// ============================================================================
// Connection Configuration
// ============================================================================

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";

pub const DEFAULT_DATABASE: &str = "plp_bookstore";

pub const DEFAULT_COLLECTION: &str = "books";

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the driver waits for a suitable server before failing an operation
///
/// Kept short so that an unreachable deployment surfaces as a failure of the
/// connectivity check instead of stalling the first catalog operation for the
/// driver's 30 second default.
pub const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

pub const APP_NAME: &str = "bookstore-queries";

// ============================================================================
// Catalog Configuration
// ============================================================================

/// Number of titles per page in the pagination section
pub const DEFAULT_PAGE_SIZE: u64 = 5;

/// Number of pages the pagination section prints
pub const PAGES_SHOWN: u64 = 2;

/// Label used when a value is missing from a document or a plan
pub const MISSING_LABEL: &str = "N/A";

/// Where the runner connects and which collection it reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

/// Parameters of the fixed operation catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub genre: String,
    pub published_after: i32,
    pub author: String,
    pub updated_title: String,
    pub updated_price: f64,
    pub deleted_title: String,
    pub in_stock_after: i32,
    pub page_size: u64,
    pub pages: u64,
    pub explained_year: i32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            genre: "Fiction".to_string(),
            published_after: 1950,
            author: "George Orwell".to_string(),
            updated_title: "1984".to_string(),
            updated_price: 11.99,
            deleted_title: "Moby Dick".to_string(),
            in_stock_after: 2010,
            page_size: DEFAULT_PAGE_SIZE,
            pages: PAGES_SHOWN,
            explained_year: 1949,
        }
    }
}
