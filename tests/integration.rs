//! Integration tests for fanlens
//!
//! These tests require Chrome to be installed and available.
//! Run with: cargo test --test integration -- --ignored

use std::time::Duration;

use fanlens::{Browser, HarvestConfig};

/// Check if Chrome is available
fn chrome_available() -> bool {
    fanlens::browser::find_chrome().is_ok()
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_browser_launch() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let version = browser.version().await.expect("Failed to get version");
    assert!(version.contains("Chrome"));
    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_browser_launch_visible() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let config = HarvestConfig::visible();
    let browser = Browser::launch_with_config(&config)
        .await
        .expect("Failed to launch browser");
    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_page_navigation() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page().await.expect("Failed to create page");

    page.goto("data:text/html,<h1>Hello</h1>")
        .await
        .expect("Failed to navigate");

    let content = page.content().await.expect("Failed to get content");
    assert!(content.contains("Hello"));

    let url = page.url().await.expect("Failed to get URL");
    assert!(url.starts_with("data:"));

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_element_finding() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page().await.expect("Failed to create page");

    page.goto(
        r#"data:text/html,
        <h1 id="headline">Profile Name</h1>
        <img class="avatar" src="https://cdn.example.com/a.jpg">
    "#,
    )
    .await
    .expect("Failed to navigate");

    // Find by ID
    let headline = page.find("#headline").await.expect("Failed to find h1");
    let text = headline.text().await.expect("Failed to get text");
    assert_eq!(text.trim(), "Profile Name");

    // Find by class, read an attribute
    let avatar = page.find(".avatar").await.expect("Failed to find img");
    let src = avatar.attribute("src").await.expect("Failed to get attr");
    assert_eq!(src.as_deref(), Some("https://cdn.example.com/a.jpg"));
    let missing = avatar.attribute("alt").await.expect("Failed to get attr");
    assert!(missing.is_none());

    // Find all
    let all = page.find_all("*").await.expect("Failed to find all");
    assert!(all.len() > 2);

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_find_any_falls_through() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page().await.expect("Failed to create page");

    page.goto(r#"data:text/html,<span class="badge">verified</span>"#)
        .await
        .expect("Failed to navigate");

    let badge = page
        .find_any(&["#nonexistent", ".badge"])
        .await
        .expect("Failed to fall through to second selector");
    let text = badge.text().await.expect("Failed to get text");
    assert_eq!(text.trim(), "verified");

    let result = page.find_any(&["#nope", ".missing"]).await;
    assert!(result.is_err());

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_element_not_found() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page().await.expect("Failed to create page");

    page.goto("data:text/html,<div>Simple</div>")
        .await
        .expect("Failed to navigate");

    let result = page.find("#nonexistent").await;
    assert!(result.is_err());

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_evaluate_javascript() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page().await.expect("Failed to create page");

    // Evaluate simple expression
    let result: i32 = page.evaluate("1 + 2").await.expect("Failed to evaluate");
    assert_eq!(result, 3);

    // Evaluate string
    let result: String = page
        .evaluate("'hello' + ' world'")
        .await
        .expect("Failed to evaluate");
    assert_eq!(result, "hello world");

    // Evaluate array
    let result: Vec<i32> = page.evaluate("[1, 2, 3]").await.expect("Failed to evaluate");
    assert_eq!(result, vec![1, 2, 3]);

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_webdriver_flag_masked() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page().await.expect("Failed to create page");

    // The override applies to documents created after page setup
    page.goto("data:text/html,<p>probe</p>")
        .await
        .expect("Failed to navigate");

    let webdriver: bool = page
        .evaluate("navigator.webdriver === true")
        .await
        .expect("Failed to evaluate");
    assert!(!webdriver);

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_wait_for_element() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page().await.expect("Failed to create page");

    // Page with delayed element
    page.goto(
        r#"data:text/html,
        <script>
            setTimeout(() => {
                document.body.innerHTML = '<div id="delayed">Loaded!</div>';
            }, 100);
        </script>
    "#,
    )
    .await
    .expect("Failed to navigate");

    let element = page
        .wait_for("#delayed", Duration::from_secs(5))
        .await
        .expect("Element not found");
    let text = element.text().await.expect("Failed to get text");
    assert!(text.contains("Loaded!"));

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_wait_for_element_timeout() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page().await.expect("Failed to create page");

    page.goto("data:text/html,<div>No delayed element</div>")
        .await
        .expect("Failed to navigate");

    let result = page.wait_for("#never-exists", Duration::from_millis(500)).await;
    assert!(result.is_err());

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome and network access"]
async fn test_network_log_drains_and_consumes() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page().await.expect("Failed to create page");
    let log = browser.network_log();

    page.goto("https://example.com")
        .await
        .expect("Failed to navigate");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let entries = log.drain().await;
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e.method.starts_with("Network.")));
    assert!(entries.iter().all(|e| e.timestamp > 0));

    let requests: Vec<_> = entries
        .iter()
        .filter_map(|e| e.request_will_be_sent())
        .collect();
    assert!(
        requests
            .iter()
            .any(|event| event.request.url.contains("example.com")),
        "expected a request for the navigated origin"
    );
    let request_ids: Vec<String> = requests.into_iter().map(|event| event.request_id).collect();

    // Drained entries are consumed, never re-delivered
    let again = log.drain().await;
    for entry in &again {
        if let Some(event) = entry.request_will_be_sent() {
            assert!(!request_ids.contains(&event.request_id));
        }
    }

    browser.close().await.expect("Failed to close browser");
}
