//! Page Interaction
//!
//! Wraps an attached target session with the small surface the harvest
//! pipeline needs: navigation, selector lookups with timeouts, element
//! reads, and script evaluation.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::cdp::Session;
use crate::error::{Error, Result};

/// Escape a string for safe embedding in single-quoted JavaScript
fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', "\\\"")
        .replace('`', "\\`")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace("${", "\\${")
}

/// A page within the browser
pub struct Page {
    session: Session,
}

impl Page {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// The CDP session backing this page
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Navigate to a URL
    pub async fn goto(&self, url: &str) -> Result<()> {
        tracing::debug!("Navigating to {}", url);
        let result = self.session.navigate(url).await?;

        if let Some(error) = result.error_text {
            if !error.is_empty() {
                return Err(Error::Navigation(format!(
                    "Failed to navigate to {}: {}",
                    url, error
                )));
            }
        }

        // Give the page a moment to start loading
        tokio::time::sleep(Duration::from_millis(100)).await;

        Ok(())
    }

    /// Get the current URL
    pub async fn url(&self) -> Result<String> {
        let tree = self.session.get_frame_tree().await?;
        Ok(tree.frame.url)
    }

    /// Get the full page HTML
    pub async fn content(&self) -> Result<String> {
        self.evaluate("document.documentElement.outerHTML").await
    }

    /// Find an element by CSS selector
    pub async fn find(&self, selector: &str) -> Result<Element<'_>> {
        let document = self.session.get_document(Some(0)).await?;
        let node_id = self.session.query_selector(document.node_id, selector).await?;

        if node_id == 0 {
            return Err(Error::ElementNotFound(selector.to_string()));
        }

        Ok(Element {
            page: self,
            node_id,
        })
    }

    /// Find all elements matching a CSS selector
    pub async fn find_all(&self, selector: &str) -> Result<Vec<Element<'_>>> {
        let document = self.session.get_document(Some(0)).await?;
        let node_ids = self
            .session
            .query_selector_all(document.node_id, selector)
            .await?;

        Ok(node_ids
            .into_iter()
            .filter(|&id| id != 0)
            .map(|node_id| Element {
                page: self,
                node_id,
            })
            .collect())
    }

    /// Try each selector in order, returning the first element found
    pub async fn find_any(&self, selectors: &[&str]) -> Result<Element<'_>> {
        for selector in selectors {
            if let Ok(element) = self.find(selector).await {
                return Ok(element);
            }
        }

        Err(Error::ElementNotFound(format!(
            "None of the selectors matched: {:?}",
            selectors
        )))
    }

    /// Wait for an element to appear, polling until the timeout
    pub async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<Element<'_>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Ok(element) = self.find(selector).await {
                return Ok(element);
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "Timed out waiting for selector: {}",
                    selector
                )));
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Evaluate JavaScript and deserialize the result
    pub async fn evaluate<T: DeserializeOwned>(&self, expression: &str) -> Result<T> {
        let result = self.session.evaluate(expression).await?;

        if let Some(exception) = result.exception_details {
            return Err(Error::CdpSimple(format!(
                "JavaScript error: {} at {}:{}",
                exception.text, exception.line_number, exception.column_number
            )));
        }

        match result.result.value {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Err(Error::CdpSimple(
                "No value returned from evaluate".to_string(),
            )),
        }
    }

    /// Fetch a captured response body by request id
    ///
    /// Returns the raw body string and whether it is base64-encoded.
    pub async fn response_body(&self, request_id: &str) -> Result<(String, bool)> {
        self.session.get_response_body(request_id).await
    }
}

/// An element on a page
pub struct Element<'a> {
    page: &'a Page,
    node_id: i32,
}

impl Element<'_> {
    /// The DOM node id of this element
    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    /// Call a function with this element bound to `this`
    async fn eval_on_self(&self, body: &str) -> Result<serde_json::Value> {
        let object_id = self.page.session.resolve_node(self.node_id).await?;
        let result = self
            .page
            .session
            .call_function_on(&object_id, &format!("function() {{ return {}; }}", body))
            .await?;

        if let Some(exception) = result.exception_details {
            return Err(Error::CdpSimple(format!(
                "JavaScript error: {}",
                exception.text
            )));
        }

        Ok(result.result.value.unwrap_or(serde_json::Value::Null))
    }

    /// The text content of this element
    pub async fn text(&self) -> Result<String> {
        let value = self.eval_on_self("this.textContent").await?;
        Ok(value.as_str().unwrap_or("").to_string())
    }

    /// Read an attribute, `None` if it is not present
    pub async fn attribute(&self, name: &str) -> Result<Option<String>> {
        let value = self
            .eval_on_self(&format!("this.getAttribute('{}')", escape_js_string(name)))
            .await?;
        Ok(value.as_str().map(|s| s.to_string()))
    }
}
