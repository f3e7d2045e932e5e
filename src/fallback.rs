//! Source and DOM Fallback
//!
//! When no API response could be intercepted, the profile page itself is
//! still loaded. Frontend frameworks leave their bootstrap state in the
//! page source, and failing that the visible DOM carries at least a name
//! and an avatar. Two stages: scan the HTML for embedded JSON, then
//! scrape selectors for a degraded record.

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::page::Page;
use crate::profile::ProfileRecord;
use crate::HarvestConfig;

/// Framework bootstrap globals, each capturing the assigned object
const STATE_PATTERNS: [&str; 3] = [
    r"window\.__INITIAL_STATE__\s*=\s*(\{.+?\});",
    r"window\.__NUXT__\s*=\s*(\{.+?\});",
    r"window\.__APP_STATE__\s*=\s*(\{.+?\});",
];

const NAME_SELECTORS: [&str; 9] = [
    "h1",
    "h2",
    "h3",
    ".profile-name",
    "[data-testid=\"profile-name\"]",
    ".m-username",
    ".profile-title",
    ".user-name",
    "title",
];

const AVATAR_SELECTORS: [&str; 8] = [
    "img[src*=\"avatar\"]",
    "img[alt*=\"avatar\"]",
    ".profile-avatar img",
    ".avatar img",
    "[data-testid=\"profile-avatar\"] img",
    ".m-avatar img",
    ".user-avatar img",
    "img[src*=\"profile\"]",
];

const VERIFIED_SELECTORS: [&str; 9] = [
    ".verified-badge",
    ".m-verified",
    "[data-testid=\"verified-badge\"]",
    ".icon-verified",
    ".verified",
    "svg[aria-label*=\"verified\"]",
    "svg[aria-label*=\"Verified\"]",
    "[title*=\"verified\"]",
    "[title*=\"Verified\"]",
];

/// Depth-first search for the first object whose `username` equals the
/// identity. Maps are searched before their sibling sequences, and the
/// walk stops at `depth` levels to survive self-referential state blobs.
fn find_identity_record<'a>(data: &'a Value, identity: &str, depth: u32) -> Option<&'a Value> {
    if depth == 0 {
        return None;
    }

    match data {
        Value::Object(map) => {
            if map.get("username").and_then(Value::as_str) == Some(identity) {
                return Some(data);
            }
            for value in map.values() {
                if value.is_object() || value.is_array() {
                    if let Some(found) = find_identity_record(value, identity, depth - 1) {
                        return Some(found);
                    }
                }
            }
            None
        }
        Value::Array(items) => {
            for item in items {
                if item.is_object() || item.is_array() {
                    if let Some(found) = find_identity_record(item, identity, depth - 1) {
                        return Some(found);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// Scan page HTML for an embedded JSON object describing the identity
///
/// Unparseable candidates are skipped. Returns the matched object, which
/// is API-shaped and feeds the normal formatter.
fn extract_from_source(html: &str, identity: &str, depth: u32) -> Option<Value> {
    let mut candidates: Vec<String> = Vec::new();

    for pattern in STATE_PATTERNS {
        if let Ok(re) = Regex::new(&format!("(?s){}", pattern)) {
            for caps in re.captures_iter(html) {
                candidates.push(caps[1].to_string());
            }
        }
    }

    // Inline API responses serialized into script tags
    let api_object = format!(
        r#"\{{"id":\d+,"name":"[^"]*","username":"{}"[^}}]+\}}"#,
        regex::escape(identity)
    );
    if let Ok(re) = Regex::new(&api_object) {
        for m in re.find_iter(html) {
            candidates.push(m.as_str().to_string());
        }
    }

    // Last resort: any flat object that names the identity
    let loose = format!(
        r#"\{{[^{{}}]*"username"\s*:\s*"{}"[^{{}}]*\}}"#,
        regex::escape(identity)
    );
    if let Ok(re) = Regex::new(&loose) {
        for m in re.find_iter(html) {
            candidates.push(m.as_str().to_string());
        }
    }

    for candidate in candidates {
        let Ok(parsed) = serde_json::from_str::<Value>(&candidate) else {
            continue;
        };
        if let Some(found) = find_identity_record(&parsed, identity, depth) {
            tracing::debug!("Found identity record in page source for {}", identity);
            return Some(found.clone());
        }
    }

    None
}

/// Scrape name, avatar and verification badge from the rendered DOM
///
/// Every selector chain tolerates total failure; the result is a record
/// built from whatever stuck.
async fn scrape_dom(page: &Page, identity: &str) -> ProfileRecord {
    let mut data = Map::new();

    for selector in NAME_SELECTORS {
        let Ok(element) = page.find(selector).await else {
            continue;
        };
        if let Ok(text) = element.text().await {
            let text = text.trim();
            if !text.is_empty() && text != identity {
                data.insert("name".to_string(), json!(text));
                break;
            }
        }
    }

    for selector in AVATAR_SELECTORS {
        let Ok(element) = page.find(selector).await else {
            continue;
        };
        if let Ok(Some(src)) = element.attribute("src").await {
            if !src.is_empty() {
                data.insert("avatar".to_string(), json!(src));
                break;
            }
        }
    }

    let verified = page.find_any(&VERIFIED_SELECTORS).await.is_ok();
    data.insert("isVerified".to_string(), json!(verified));

    let mut record = ProfileRecord::from_api(identity, &Value::Object(data));
    record.raw_api_data = Value::Null;
    record
}

/// Recover a profile from the already-loaded page
///
/// Source scan first; a hit goes through the normal formatter with its
/// payload attached. Otherwise the DOM scrape produces a degraded record.
pub async fn recover_profile(page: &Page, identity: &str, config: &HarvestConfig) -> ProfileRecord {
    match page.content().await {
        Ok(html) => {
            if let Some(data) = extract_from_source(&html, identity, config.search_depth) {
                tracing::info!("Recovered {} from embedded page state", identity);
                return ProfileRecord::from_api(identity, &data);
            }
        }
        Err(e) => {
            tracing::warn!("Could not read page source for {}: {}", identity, e);
        }
    }

    tracing::info!("Falling back to DOM scrape for {}", identity);
    scrape_dom(page, identity).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursive_search_depth_three() {
        let data = json!({
            "a": {
                "b": {
                    "username": "alice",
                    "name": "Alice"
                }
            }
        });

        let found = find_identity_record(&data, "alice", 3).unwrap();
        assert_eq!(found.get("name").unwrap(), "Alice");

        assert!(find_identity_record(&data, "alice", 2).is_none());
    }

    #[test]
    fn test_recursive_search_descends_arrays() {
        let data = json!({
            "users": [
                {"username": "bob"},
                {"username": "alice", "postsCount": 9}
            ]
        });

        let found = find_identity_record(&data, "alice", 8).unwrap();
        assert_eq!(found.get("postsCount").unwrap(), 9);
    }

    #[test]
    fn test_recursive_search_is_case_sensitive() {
        let data = json!({"username": "Alice"});
        assert!(find_identity_record(&data, "alice", 8).is_none());
    }

    #[test]
    fn test_extract_from_initial_state() {
        let html = r#"<html><script>
            window.__INITIAL_STATE__ = {"session": {"user": {"username": "alice", "postsCount": 3}}};
        </script></html>"#;

        let found = extract_from_source(html, "alice", 32).unwrap();
        assert_eq!(found.get("postsCount").unwrap(), 3);
    }

    #[test]
    fn test_extract_loose_object() {
        let html = r#"<script>var cache = {"username":"alice","name":"Alice"};</script>"#;

        let found = extract_from_source(html, "alice", 32).unwrap();
        assert_eq!(found.get("name").unwrap(), "Alice");
    }

    #[test]
    fn test_extract_skips_unparseable_candidates() {
        // The first state blob is cut off mid-object; the loose match
        // later in the page still wins.
        let html = concat!(
            r#"<script>window.__NUXT__ = {"broken": };</script>"#,
            r#"<script>var u = {"username":"alice","isVerified":true};</script>"#
        );

        let found = extract_from_source(html, "alice", 32).unwrap();
        assert_eq!(found.get("isVerified").unwrap(), true);
    }

    #[test]
    fn test_extract_misses_other_identities() {
        let html = r#"<script>var u = {"username":"bob","name":"Bob"};</script>"#;
        assert!(extract_from_source(html, "alice", 32).is_none());
    }
}
