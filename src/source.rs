//! Profile Sources
//!
//! The capability interface every profile provider implements, the
//! browser-backed harvester that does the real work, and a mock used by
//! tests and offline runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::browser::Browser;
use crate::error::{Error, Result};
use crate::fallback;
use crate::intercept;
use crate::netlog::NetworkLog;
use crate::page::Page;
use crate::profile::ProfileRecord;
use crate::tokens::{extract_tokens, TokenSet};
use crate::HarvestConfig;

/// Anything that can produce profile records and auth tokens
///
/// The direct API client and the batch runner only talk to this trait,
/// so a browser session and a mock are interchangeable.
#[async_trait]
pub trait ProfileSource: Send {
    /// Bring the source up. Safe to call when already started.
    async fn start(&mut self) -> Result<()>;

    /// Tear the source down. Safe to call when not started.
    async fn close(&mut self) -> Result<()>;

    /// Produce a record for one identity
    async fn get_profile_data(&mut self, identity: &str) -> Result<ProfileRecord>;

    /// Snapshot of the current token set
    fn tokens(&self) -> TokenSet;

    /// Recapture tokens from fresh traffic
    async fn refresh_tokens(&mut self) -> Result<()>;

    /// True iff the token set invariant holds
    fn tokens_valid(&self) -> bool;
}

/// Browser-driven profile source
///
/// Owns one browser exclusively. Interception is tried first for every
/// identity; any interception failure drops to the source/DOM fallback
/// on the already-loaded page.
pub struct Harvester {
    config: HarvestConfig,
    browser: Option<Browser>,
    page: Option<Page>,
    log: Option<NetworkLog>,
    tokens: TokenSet,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Self {
        Self {
            config,
            browser: None,
            page: None,
            log: None,
            tokens: TokenSet::default(),
        }
    }

    async fn ensure_started(&mut self) -> Result<()> {
        if self.page.is_none() {
            self.start().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileSource for Harvester {
    async fn start(&mut self) -> Result<()> {
        if self.page.is_some() {
            return Ok(());
        }

        let browser = Browser::launch_with_config(&self.config).await?;
        let page = browser.new_page().await?;
        let log = browser.network_log();

        self.browser = Some(browser);
        self.page = Some(page);
        self.log = Some(log);

        tracing::info!("Harvest session started");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.page = None;
        self.log = None;

        if let Some(browser) = self.browser.take() {
            browser.close().await?;
            tracing::info!("Harvest session closed");
        }

        Ok(())
    }

    async fn get_profile_data(&mut self, identity: &str) -> Result<ProfileRecord> {
        let (Some(page), Some(log)) = (self.page.as_ref(), self.log.as_ref()) else {
            return Err(Error::SessionNotStarted);
        };

        match intercept::capture_profile(page, log, identity, &self.config).await {
            Ok(payload) => {
                tracing::info!("Using intercepted API payload for {}", identity);
                Ok(ProfileRecord::from_api(identity, &payload))
            }
            Err(e) => {
                tracing::warn!("Interception failed for {}: {}", identity, e);
                Ok(fallback::recover_profile(page, identity, &self.config).await)
            }
        }
    }

    fn tokens(&self) -> TokenSet {
        self.tokens.clone()
    }

    async fn refresh_tokens(&mut self) -> Result<()> {
        self.ensure_started().await?;

        let (Some(page), Some(log)) = (self.page.as_ref(), self.log.as_ref()) else {
            return Err(Error::SessionNotStarted);
        };

        page.goto(&self.config.base_url).await?;
        page.wait_for("body", self.config.nav_timeout).await?;

        // Let the frontend fire its background API calls
        tokio::time::sleep(self.config.settle_delay).await;

        let entries = log.drain().await;
        let fresh = extract_tokens(&entries);

        tracing::debug!(
            "Token refresh captured x-bc: {}, sign: {}, x-hash: {}",
            fresh.x_bc.is_some(),
            fresh.sign.is_some(),
            fresh.x_hash.is_some()
        );

        self.tokens.merge(fresh);
        Ok(())
    }

    fn tokens_valid(&self) -> bool {
        self.tokens.is_valid()
    }
}

/// Canned profile source for tests and offline runs
pub struct MockSource {
    profiles: HashMap<String, ProfileRecord>,
    failing: HashSet<String>,
    tokens: TokenSet,
    started: bool,
}

impl MockSource {
    pub fn new() -> Self {
        let mut profiles = HashMap::new();

        for (username, name, posts, verified) in [
            ("testuser", "Test User", 10, false),
            ("sample_creator", "Sample Creator", 156, true),
        ] {
            let data = serde_json::json!({
                "username": username,
                "name": name,
                "postsCount": posts,
                "isVerified": verified,
                "avatar": format!("https://example.com/{}.jpg", username),
            });
            profiles.insert(username.to_string(), ProfileRecord::from_api(username, &data));
        }

        Self {
            profiles,
            failing: HashSet::new(),
            tokens: TokenSet {
                x_bc: Some("mock_x_bc_token".into()),
                sign: Some("mock_sign_token".into()),
                x_hash: Some("mock_x_hash_token".into()),
            },
            started: false,
        }
    }

    /// Add or replace a canned profile
    pub fn with_profile(mut self, record: ProfileRecord) -> Self {
        self.profiles.insert(record.username.to_lowercase(), record);
        self
    }

    /// Make one identity always fail
    pub fn failing_for(mut self, identity: &str) -> Self {
        self.failing.insert(identity.to_string());
        self
    }

    /// Replace the mock token set
    pub fn with_tokens(mut self, tokens: TokenSet) -> Self {
        self.tokens = tokens;
        self
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileSource for MockSource {
    async fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    async fn get_profile_data(&mut self, identity: &str) -> Result<ProfileRecord> {
        if !self.started {
            return Err(Error::SessionNotStarted);
        }

        if self.failing.contains(identity) {
            return Err(Error::Navigation(format!(
                "Simulated failure for {}",
                identity
            )));
        }

        self.profiles
            .get(&identity.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::Timeout(format!("No canned profile for {}", identity)))
    }

    fn tokens(&self) -> TokenSet {
        self.tokens.clone()
    }

    async fn refresh_tokens(&mut self) -> Result<()> {
        Ok(())
    }

    fn tokens_valid(&self) -> bool {
        self.tokens.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_requires_start() {
        let mut source = MockSource::new();
        assert!(matches!(
            source.get_profile_data("testuser").await,
            Err(Error::SessionNotStarted)
        ));

        source.start().await.unwrap();
        let record = source.get_profile_data("testuser").await.unwrap();
        assert_eq!(record.name, "Test User");
        assert_eq!(record.posts_count, 10);
    }

    #[tokio::test]
    async fn test_mock_failure_and_unknown() {
        let mut source = MockSource::new().failing_for("broken");
        source.start().await.unwrap();

        assert!(source.get_profile_data("broken").await.is_err());
        assert!(source.get_profile_data("nobody_here").await.is_err());
    }

    #[test]
    fn test_mock_tokens_valid() {
        let source = MockSource::new();
        assert!(source.tokens_valid());
        assert_eq!(source.tokens().x_bc.as_deref(), Some("mock_x_bc_token"));

        let source = MockSource::new().with_tokens(TokenSet::default());
        assert!(!source.tokens_valid());
    }
}
