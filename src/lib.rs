//! # Fanlens
//!
//! Creator-profile metadata harvesting through browser network interception.
//!
//! Fanlens drives a real Chrome over a custom CDP (Chrome DevTools Protocol)
//! connection and lets the target site's own frontend do the talking: the
//! profile page is loaded, its API call happens with whatever signed headers
//! the site expects, and the JSON answer is lifted straight off the wire.
//! When nothing can be intercepted, embedded page state and DOM scraping
//! still produce a (degraded) record. Results are normalized into one
//! canonical shape and persisted with at most one snapshot per profile per
//! day.
//!
//! ## Features
//!
//! - **Interception over reverse-engineering** - no signing scheme to chase
//! - **Layered fallbacks** - API payload, embedded state, DOM scrape
//! - **Token capture** - auth headers harvested from observed traffic
//! - **Daily snapshots** - sqlite or postgres, same interface
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fanlens::{Harvester, ProfileSource};
//!
//! #[tokio::main]
//! async fn main() -> fanlens::Result<()> {
//!     let mut source = Harvester::new(Default::default());
//!     source.start().await?;
//!
//!     let record = source.get_profile_data("some_creator").await?;
//!     println!("{} has {} posts", record.name, record.posts_count);
//!
//!     source.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use fanlens::{Harvester, HarvestConfig};
//!
//! # fn main() {
//! let config = HarvestConfig {
//!     headless: false,
//!     poll_attempts: 60,
//!     ..Default::default()
//! };
//!
//! let source = Harvester::new(config);
//! # let _ = source;
//! # }
//! ```

use std::time::Duration;

pub mod batch;
pub mod browser;
pub mod cdp;
pub mod client;
pub mod config;
pub mod error;
pub mod fallback;
pub mod intercept;
pub mod netlog;
pub mod page;
pub mod profile;
pub mod source;
pub mod store;
pub mod tokens;

// Re-exports
pub use batch::{load_identities, run_batch, BatchReport};
pub use browser::Browser;
pub use client::ApiClient;
pub use config::{Config, Overrides, StoreConfig};
pub use error::{Error, Result};
pub use netlog::{LogEntry, NetworkLog};
pub use page::{Element, Page};
pub use profile::{MediaCounts, ProfileRecord, SubscriberData};
pub use source::{Harvester, MockSource, ProfileSource};
pub use store::{create_store, ProfileStore, StoredProfile};
pub use tokens::{extract_tokens, TokenSet};

/// Tuning for a harvest session
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Headless mode
    pub headless: bool,
    /// Path to Chrome/Chromium binary (None = discover)
    pub chrome_path: Option<String>,
    /// Custom user agent (None = random realistic)
    pub user_agent: Option<String>,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Platform frontend base URL
    pub base_url: String,
    /// How long to wait for a page-ready signal after navigation
    pub nav_timeout: Duration,
    /// Pause between network log polls
    pub poll_interval: Duration,
    /// Network log polls before interception gives up
    pub poll_attempts: u32,
    /// Settle time after loading the home page during token refresh
    pub settle_delay: Duration,
    /// Recursion bound when searching embedded page state
    pub search_depth: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: None,
            viewport_width: 1920,
            viewport_height: 1080,
            base_url: "https://onlyfans.com".to_string(),
            nav_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            poll_attempts: 30,
            settle_delay: Duration::from_secs(2),
            search_depth: 32,
        }
    }
}

impl HarvestConfig {
    /// Create a visible (non-headless) config
    pub fn visible() -> Self {
        Self {
            headless: false,
            ..Default::default()
        }
    }
}
