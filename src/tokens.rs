//! Auth Token Capture
//!
//! The site's own frontend stamps every API request with rotating
//! auth headers. Watching outbound requests and copying the most recent
//! values is enough to replay API calls without reverse-engineering the
//! signing scheme.

use serde::{Deserialize, Serialize};

use crate::netlog::LogEntry;

/// Header names the extractor watches for, matched case-sensitively
const TOKEN_HEADERS: [&str; 3] = ["x-bc", "sign", "x-hash"];

/// The trio of auth headers needed to replay API requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub x_bc: Option<String>,
    pub sign: Option<String>,
    pub x_hash: Option<String>,
}

impl TokenSet {
    /// True only when every token is present and non-empty
    pub fn is_valid(&self) -> bool {
        [&self.x_bc, &self.sign, &self.x_hash]
            .iter()
            .all(|t| t.as_deref().is_some_and(|v| !v.is_empty()))
    }

    /// Overlay another set, keeping existing values where the other
    /// captured nothing
    pub fn merge(&mut self, newer: TokenSet) {
        if newer.x_bc.is_some() {
            self.x_bc = newer.x_bc;
        }
        if newer.sign.is_some() {
            self.sign = newer.sign;
        }
        if newer.x_hash.is_some() {
            self.x_hash = newer.x_hash;
        }
    }

    fn set(&mut self, header: &str, value: &str) {
        match header {
            "x-bc" => self.x_bc = Some(value.to_string()),
            "sign" => self.sign = Some(value.to_string()),
            "x-hash" => self.x_hash = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Scan drained network events for auth headers
///
/// Later requests overwrite earlier ones, so the result holds the newest
/// value seen for each header. Events that are not outbound requests are
/// skipped.
pub fn extract_tokens(entries: &[LogEntry]) -> TokenSet {
    let mut tokens = TokenSet::default();

    for entry in entries {
        let Some(event) = entry.request_will_be_sent() else {
            continue;
        };

        for header in TOKEN_HEADERS {
            if let Some(value) = event.request.headers.get(header) {
                tokens.set(header, value);
            }
        }
    }

    tokens
}
