//! API Response Interception
//!
//! Loads a profile page and watches the captured network events for the
//! site's own profile API response, instead of calling the API directly.
//! The page is allowed to make the request with whatever auth headers it
//! wants; we only read the answer off the wire.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::netlog::NetworkLog;
use crate::page::Page;
use crate::HarvestConfig;

/// True for a response that looks like the profile API answering for
/// this identity
fn is_profile_response(url: &str, status: i32, identity: &str) -> bool {
    status == 200 && url.contains(&format!("api2/v2/users/{}", identity))
}

/// Undo CDP's base64 wrapping when the body was flagged as encoded
fn decode_body(body: &str, base64_encoded: bool) -> Result<String> {
    if !base64_encoded {
        return Ok(body.to_string());
    }

    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| Error::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::Decode(e.to_string()))
}

/// The payload is only trusted when it names the requested identity.
/// SPAs replay cached profile responses for accounts browsed earlier in
/// the session, and those must not be mistaken for the current one.
fn payload_matches_identity(payload: &Value, identity: &str) -> bool {
    payload.get("username").and_then(Value::as_str) == Some(identity)
}

/// Capture the profile API payload for `identity`
///
/// Discards stale events, navigates to the profile page, then polls the
/// drained network log until a matching response shows up or the attempt
/// budget runs out. Individual bad entries (evicted bodies, undecodable
/// payloads, responses for the wrong account) are skipped, not fatal.
pub async fn capture_profile(
    page: &Page,
    log: &NetworkLog,
    identity: &str,
    config: &HarvestConfig,
) -> Result<Value> {
    // Flush events left over from whatever the page did before
    let stale = log.drain().await;
    if !stale.is_empty() {
        tracing::debug!("Discarded {} stale network events", stale.len());
    }

    let url = format!("{}/{}", config.base_url, identity);
    page.goto(&url).await?;
    page.wait_for("body", config.nav_timeout).await?;

    for attempt in 0..config.poll_attempts {
        for entry in log.drain().await {
            let Some(event) = entry.response_received() else {
                continue;
            };

            if !is_profile_response(&event.response.url, event.response.status, identity) {
                continue;
            }

            tracing::debug!(
                "Candidate response on attempt {}: {}",
                attempt + 1,
                event.response.url
            );

            let (body, base64_encoded) = match page.response_body(&event.request_id).await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::debug!("Body unavailable for {}: {}", event.request_id, e);
                    continue;
                }
            };

            let decoded = match decode_body(&body, base64_encoded) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!("Undecodable body for {}: {}", event.request_id, e);
                    continue;
                }
            };

            let payload: Value = match serde_json::from_str(&decoded) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!("Non-JSON body for {}: {}", event.request_id, e);
                    continue;
                }
            };

            if payload_matches_identity(&payload, identity) {
                tracing::info!("Intercepted profile payload for {}", identity);
                return Ok(payload);
            }

            tracing::debug!(
                "Payload username {:?} does not match {}, still polling",
                payload.get("username"),
                identity
            );
        }

        tokio::time::sleep(config.poll_interval).await;
    }

    Err(Error::Timeout(format!(
        "No profile API response for {} after {} attempts",
        identity, config.poll_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_response_match() {
        assert!(is_profile_response(
            "https://onlyfans.com/api2/v2/users/alice?foo=1",
            200,
            "alice"
        ));
        assert!(!is_profile_response(
            "https://onlyfans.com/api2/v2/users/alice",
            403,
            "alice"
        ));
        assert!(!is_profile_response(
            "https://onlyfans.com/api2/v2/posts/alice",
            200,
            "alice"
        ));
    }

    #[test]
    fn test_decode_body_passthrough_and_base64() {
        assert_eq!(decode_body("plain", false).unwrap(), "plain");

        // "eyJhIjoxfQ==" is {"a":1}
        assert_eq!(decode_body("eyJhIjoxfQ==", true).unwrap(), r#"{"a":1}"#);

        assert!(decode_body("not base64!!!", true).is_err());
    }

    #[test]
    fn test_identity_match_is_case_sensitive() {
        let payload = json!({"username": "alice"});
        assert!(payload_matches_identity(&payload, "alice"));
        assert!(!payload_matches_identity(&payload, "Alice"));
        assert!(!payload_matches_identity(&json!({"username": 42}), "alice"));
        assert!(!payload_matches_identity(&json!({}), "alice"));
    }
}
