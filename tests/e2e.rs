//! End-to-end tests against a live md-server.
//!
//! These tests make real HTTP calls. They are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 MD_SERVER_ENDPOINT=http://localhost:8080 cargo test --test e2e -- --nocapture
//!
//! Set `MD_SERVER_API_KEY` as well if the server requires authentication.

use md_server_client::{ClientConfig, ConversionOptions, ErrorKind, RemoteClient};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED and MD_SERVER_ENDPOINT are both set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        match std::env::var("MD_SERVER_ENDPOINT") {
            Ok(endpoint) if !endpoint.trim().is_empty() => endpoint,
            _ => {
                println!("SKIP — MD_SERVER_ENDPOINT is not set");
                return;
            }
        }
    }};
}

fn live_client(endpoint: &str) -> RemoteClient {
    let config = ClientConfig::builder(endpoint)
        .api_key_opt(std::env::var("MD_SERVER_API_KEY").ok())
        .timeout(Duration::from_secs(120))
        .max_retries(2)
        .build()
        .expect("valid e2e config");
    RemoteClient::new(config).expect("client")
}

/// Assert the markdown passes basic sanity checks.
fn assert_markdown_sane(md: &str, context: &str) {
    assert!(!md.trim().is_empty(), "[{context}] Markdown is empty");
    let first_line = md.lines().next().unwrap_or("");
    assert!(
        !first_line.starts_with("```"),
        "[{context}] Output must not start with a code fence, got: {first_line:?}"
    );
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let endpoint = e2e_skip_unless_ready!();
    let client = live_client(&endpoint);

    let health = client.health_check().await.expect("health check");
    println!("health: {health:?}");
    assert!(!health.status.is_empty());
}

#[tokio::test]
async fn test_formats() {
    let endpoint = e2e_skip_unless_ready!();
    let client = live_client(&endpoint);

    let formats = client.get_formats().await.expect("formats");
    println!("{} formats", formats.formats.len());
    assert!(!formats.formats.is_empty());
}

#[tokio::test]
async fn test_convert_html_text() {
    let endpoint = e2e_skip_unless_ready!();
    let client = live_client(&endpoint);

    let result = client
        .convert_text(
            "<h1>Hello</h1><p>World</p>",
            "text/html",
            &ConversionOptions::default().clean_markdown(true),
        )
        .await
        .expect("convert text");

    assert_markdown_sane(&result.markdown, "html text");
    assert!(result.markdown.contains("Hello"));
    assert!(!result.request_id.is_empty());
    println!(
        "{}: {} bytes in {:.3}s",
        result.request_id, result.metadata.markdown_size, result.metadata.processing_time
    );
}

#[tokio::test]
async fn test_convert_content_bytes() {
    let endpoint = e2e_skip_unless_ready!();
    let client = live_client(&endpoint);

    let result = client
        .convert_content(b"# Already markdown\n\nplain text", Some("note.md"), &ConversionOptions::default())
        .await
        .expect("convert content");
    assert_markdown_sane(&result.markdown, "content bytes");
}

#[tokio::test]
async fn test_convert_file() {
    let endpoint = e2e_skip_unless_ready!();
    let client = live_client(&endpoint);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.html");
    std::fs::write(&path, "<html><body><h2>Section</h2><ul><li>one</li><li>two</li></ul></body></html>").unwrap();

    let result = client
        .convert_file(&path, &ConversionOptions::default())
        .await
        .expect("convert file");
    assert_markdown_sane(&result.markdown, "file");
    assert!(result.markdown.contains("Section"));
}

#[test]
fn test_sync_convert_text() {
    let endpoint = e2e_skip_unless_ready!();
    let client = live_client(&endpoint);

    let result = client
        .convert_text_sync("plain words", "text/plain", &ConversionOptions::default())
        .expect("sync convert");
    assert_markdown_sane(&result.markdown, "sync text");
    client.close();
}

#[tokio::test]
async fn test_invalid_url_is_rejected_locally() {
    let endpoint = e2e_skip_unless_ready!();
    let client = live_client(&endpoint);

    let err = client
        .convert_url("ftp://example.com/file.pdf", &ConversionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
