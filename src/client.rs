//! Direct API Client
//!
//! Token-authenticated requests straight at the profile endpoint, no
//! browser in the loop. Tokens come from a [`ProfileSource`], which also
//! handles refreshing them when the API stops accepting them.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use crate::error::Result;
use crate::profile::ProfileRecord;
use crate::source::ProfileSource;
use crate::tokens::TokenSet;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn get_profile(&self, identity: &str, tokens: &TokenSet) -> Result<reqwest::Response> {
        let url = format!("{}/api2/v2/users/{}", self.base_url, identity);

        let response = self
            .http
            .get(&url)
            .header("accept", "application/json")
            .header("x-bc", tokens.x_bc.as_deref().unwrap_or_default())
            .header("sign", tokens.sign.as_deref().unwrap_or_default())
            .header("x-hash", tokens.x_hash.as_deref().unwrap_or_default())
            .send()
            .await?;

        Ok(response)
    }

    /// Fetch one profile directly from the API
    ///
    /// Invalid tokens at entry trigger one refresh through the source; a
    /// 401 answer triggers exactly one more refresh-and-retry. Any other
    /// non-200 yields `None`. Two requests is the ceiling.
    pub async fn fetch(
        &self,
        identity: &str,
        source: &mut dyn ProfileSource,
    ) -> Result<Option<ProfileRecord>> {
        if !source.tokens_valid() {
            tracing::info!("Token set incomplete, refreshing before direct fetch");
            source.refresh_tokens().await?;

            if !source.tokens_valid() {
                tracing::warn!("Token set still incomplete after refresh, giving up");
                return Ok(None);
            }
        }

        let mut response = self.get_profile(identity, &source.tokens()).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::info!("Direct fetch unauthorized, refreshing tokens once");
            source.refresh_tokens().await?;
            response = self.get_profile(identity, &source.tokens()).await?;
        }

        if !response.status().is_success() {
            tracing::warn!(
                "Profile API answered {} for {}",
                response.status(),
                identity
            );
            return Ok(None);
        }

        let payload: Value = response.json().await?;
        Ok(Some(ProfileRecord::from_api(identity, &payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CountingSource {
        tokens: TokenSet,
        grant_on_refresh: Option<TokenSet>,
        refreshes: usize,
    }

    impl CountingSource {
        fn valid() -> Self {
            Self {
                tokens: TokenSet {
                    x_bc: Some("bc".into()),
                    sign: Some("sig".into()),
                    x_hash: Some("hash".into()),
                },
                grant_on_refresh: None,
                refreshes: 0,
            }
        }

        fn invalid() -> Self {
            Self {
                tokens: TokenSet::default(),
                grant_on_refresh: None,
                refreshes: 0,
            }
        }

        fn granting(mut self, tokens: TokenSet) -> Self {
            self.grant_on_refresh = Some(tokens);
            self
        }
    }

    #[async_trait]
    impl ProfileSource for CountingSource {
        async fn start(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        async fn get_profile_data(&mut self, _identity: &str) -> Result<ProfileRecord> {
            Err(Error::SessionNotStarted)
        }

        fn tokens(&self) -> TokenSet {
            self.tokens.clone()
        }

        async fn refresh_tokens(&mut self) -> Result<()> {
            self.refreshes += 1;
            if let Some(granted) = self.grant_on_refresh.clone() {
                self.tokens = granted;
            }
            Ok(())
        }

        fn tokens_valid(&self) -> bool {
            self.tokens.is_valid()
        }
    }

    #[tokio::test]
    async fn test_fetch_sends_token_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api2/v2/users/alice"))
            .and(header("x-bc", "bc"))
            .and(header("sign", "sig"))
            .and(header("x-hash", "hash"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "username": "alice",
                "name": "Alice",
                "postsCount": 5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "test-agent");
        let mut source = CountingSource::valid();

        let record = client.fetch("alice", &mut source).await.unwrap().unwrap();
        assert_eq!(record.name, "Alice");
        assert_eq!(record.posts_count, 5);
        assert_eq!(source.refreshes, 0);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_exactly_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api2/v2/users/alice"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api2/v2/users/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "username": "alice",
                "name": "Alice"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "test-agent");
        let mut source = CountingSource::valid();

        let record = client.fetch("alice", &mut source).await.unwrap();
        assert!(record.is_some());
        assert_eq!(source.refreshes, 1);
    }

    #[tokio::test]
    async fn test_persistent_unauthorized_gives_up_after_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api2/v2/users/alice"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "test-agent");
        let mut source = CountingSource::valid();

        let record = client.fetch("alice", &mut source).await.unwrap();
        assert!(record.is_none());
        assert_eq!(source.refreshes, 1);
    }

    #[tokio::test]
    async fn test_other_statuses_return_none_without_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api2/v2/users/alice"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "test-agent");
        let mut source = CountingSource::valid();

        let record = client.fetch("alice", &mut source).await.unwrap();
        assert!(record.is_none());
        assert_eq!(source.refreshes, 0);
    }

    #[tokio::test]
    async fn test_invalid_tokens_skip_request_when_refresh_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "test-agent");
        let mut source = CountingSource::invalid();

        let record = client.fetch("alice", &mut source).await.unwrap();
        assert!(record.is_none());
        assert_eq!(source.refreshes, 1);
    }

    #[tokio::test]
    async fn test_invalid_tokens_proceed_after_successful_refresh() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api2/v2/users/alice"))
            .and(header("x-bc", "fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "username": "alice"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "test-agent");
        let mut source = CountingSource::invalid().granting(TokenSet {
            x_bc: Some("fresh".into()),
            sign: Some("s".into()),
            x_hash: Some("h".into()),
        });

        let record = client.fetch("alice", &mut source).await.unwrap();
        assert!(record.is_some());
        assert_eq!(source.refreshes, 1);
    }
}
