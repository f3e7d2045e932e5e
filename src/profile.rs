//! Profile Record
//!
//! The canonical shape every harvest result is normalized into, whether
//! it came from an intercepted API payload or a scraped page. Upstream
//! payloads use camelCase keys and omit anything the account doesn't
//! use, so every field defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relationship between the viewing account and the profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriberData {
    pub subscribed_by: bool,
    pub subscribed_on: bool,
    pub can_chat: bool,
}

/// Per-kind media counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaCounts {
    pub posts: i64,
    pub archived_posts: i64,
    pub photos: i64,
    pub videos: i64,
    pub audios: i64,
}

/// A harvested creator profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub username: String,
    /// Display name, falls back to the username
    pub name: String,
    pub is_verified: bool,
    pub avatar: String,
    pub header: String,
    pub about: String,
    pub posts_count: i64,
    pub photos_count: i64,
    pub videos_count: i64,
    /// Favorites this account has given
    pub favorites_count: i64,
    /// Favorites this account has received
    pub favorited_count: i64,
    pub subscribe_price: f64,
    pub tips_enabled: bool,
    pub tips_min: i64,
    pub tips_max: i64,
    pub can_earn: bool,
    pub subscriber_data: SubscriberData,
    pub media_counts: MediaCounts,
    pub join_date: String,
    pub last_seen: String,
    /// The untouched upstream payload, `Null` for DOM-derived records
    pub raw_api_data: Value,
}

fn str_of(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int_of(data: &Value, key: &str) -> i64 {
    data.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn bool_of(data: &Value, key: &str) -> bool {
    data.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Prices arrive as numbers or numeric strings depending on the endpoint
fn price_of(data: &Value, key: &str) -> f64 {
    match data.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl ProfileRecord {
    /// Normalize an upstream payload into the canonical record
    ///
    /// Never fails: missing or mistyped fields take their defaults. The
    /// original payload is kept verbatim in `raw_api_data`.
    pub fn from_api(username: &str, data: &Value) -> Self {
        let name = match data.get("name").and_then(Value::as_str) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => username.to_string(),
        };

        Self {
            username: username.to_string(),
            name,
            is_verified: bool_of(data, "isVerified"),
            avatar: str_of(data, "avatar"),
            header: str_of(data, "header"),
            about: str_of(data, "about"),
            posts_count: int_of(data, "postsCount"),
            photos_count: int_of(data, "photosCount"),
            videos_count: int_of(data, "videosCount"),
            favorites_count: int_of(data, "favoritesCount"),
            favorited_count: int_of(data, "favoritedCount"),
            subscribe_price: price_of(data, "subscribePrice"),
            tips_enabled: bool_of(data, "tipsEnabled"),
            tips_min: int_of(data, "tipsMin"),
            tips_max: int_of(data, "tipsMax"),
            can_earn: bool_of(data, "canEarn"),
            subscriber_data: SubscriberData {
                subscribed_by: bool_of(data, "subscribedBy"),
                subscribed_on: bool_of(data, "subscribedOn"),
                can_chat: bool_of(data, "canChat"),
            },
            media_counts: MediaCounts {
                posts: int_of(data, "postsCount"),
                archived_posts: int_of(data, "archivedPostsCount"),
                photos: int_of(data, "photosCount"),
                videos: int_of(data, "videosCount"),
                audios: int_of(data, "audiosCount"),
            },
            join_date: str_of(data, "joinDate"),
            last_seen: str_of(data, "lastSeen"),
            raw_api_data: data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_payload_takes_defaults() {
        let payload = json!({
            "username": "alice",
            "name": "Alice",
            "postsCount": 5
        });

        let record = ProfileRecord::from_api("alice", &payload);
        assert_eq!(record.username, "alice");
        assert_eq!(record.name, "Alice");
        assert_eq!(record.posts_count, 5);
        assert_eq!(record.photos_count, 0);
        assert!(!record.is_verified);
        assert_eq!(record.avatar, "");
        assert_eq!(record.subscribe_price, 0.0);
    }

    #[test]
    fn test_raw_payload_kept_verbatim() {
        let payload = json!({
            "username": "alice",
            "name": "Alice",
            "postsCount": 5,
            "someUnmappedKey": {"nested": [1, 2, 3]}
        });

        let record = ProfileRecord::from_api("alice", &payload);
        assert_eq!(record.raw_api_data, payload);
    }

    #[test]
    fn test_name_falls_back_to_username() {
        let record = ProfileRecord::from_api("bob", &json!({}));
        assert_eq!(record.name, "bob");

        let record = ProfileRecord::from_api("bob", &json!({"name": ""}));
        assert_eq!(record.name, "bob");
    }

    #[test]
    fn test_full_payload_maps_every_field() {
        let payload = json!({
            "name": "Carol",
            "isVerified": true,
            "avatar": "https://cdn.example.com/a.jpg",
            "header": "https://cdn.example.com/h.jpg",
            "about": "hi",
            "postsCount": 10,
            "photosCount": 7,
            "videosCount": 2,
            "favoritesCount": 4,
            "favoritedCount": 90,
            "subscribePrice": 9.99,
            "tipsEnabled": true,
            "tipsMin": 5,
            "tipsMax": 200,
            "canEarn": true,
            "subscribedBy": true,
            "subscribedOn": false,
            "canChat": true,
            "archivedPostsCount": 3,
            "audiosCount": 1,
            "joinDate": "2020-01-01",
            "lastSeen": "2026-02-01T10:00:00Z"
        });

        let record = ProfileRecord::from_api("carol", &payload);
        assert_eq!(record.name, "Carol");
        assert!(record.is_verified);
        assert_eq!(record.subscribe_price, 9.99);
        assert_eq!(record.tips_min, 5);
        assert_eq!(record.tips_max, 200);
        assert!(record.subscriber_data.subscribed_by);
        assert!(!record.subscriber_data.subscribed_on);
        assert!(record.subscriber_data.can_chat);
        assert_eq!(record.media_counts.posts, 10);
        assert_eq!(record.media_counts.archived_posts, 3);
        assert_eq!(record.media_counts.audios, 1);
        assert_eq!(record.join_date, "2020-01-01");
        assert_eq!(record.last_seen, "2026-02-01T10:00:00Z");
    }

    #[test]
    fn test_price_accepts_numeric_string() {
        let record = ProfileRecord::from_api("d", &json!({"subscribePrice": "14.50"}));
        assert_eq!(record.subscribe_price, 14.50);

        let record = ProfileRecord::from_api("d", &json!({"subscribePrice": 15}));
        assert_eq!(record.subscribe_price, 15.0);
    }
}
