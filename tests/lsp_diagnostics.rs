mod common;

use std::time::Duration;

use common::lsp_client::{TestClient, file_uri};

fn doc_uri() -> String {
    file_uri("/tmp/lsp-diagnostics-test.jsonnet")
}

async fn open_and_collect(client: &mut TestClient, uri: &str, content: &str) -> serde_json::Value {
    client.did_open(uri, "jsonnet", 1, content).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    client
        .recv_notification("textDocument/publishDiagnostics")
        .await
}

/// An unused local produces an `UnusedVar` diagnostic, tagged with our source name.
#[tokio::test]
async fn did_open_unused_local_triggers_diagnostic() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let notification = open_and_collect(&mut client, &uri, "local x = 1; 42").await;

    let diagnostics = notification["params"]["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1, "expected one diagnostic, got: {diagnostics:?}");
    assert_eq!(diagnostics[0]["code"], "UnusedVar");
    assert_eq!(diagnostics[0]["source"], "jsonnet-ls");
}

/// Clean documents with no findings produce an empty diagnostics publish.
#[tokio::test]
async fn did_open_clean_document_produces_no_diagnostics() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let notification = open_and_collect(&mut client, &uri, "local x = 1; x").await;

    let diagnostics = notification["params"]["diagnostics"].as_array().unwrap();
    assert!(diagnostics.is_empty(), "expected no diagnostics, got: {diagnostics:?}");
}

/// didChange re-validates and replaces the previous diagnostics.
#[tokio::test]
async fn did_change_updates_diagnostics() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    open_and_collect(&mut client, &uri, "local x = 1; 42").await;

    client.did_change(&uri, 2, "local x = 1; x").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let notification = client
        .recv_notification("textDocument/publishDiagnostics")
        .await;

    let diagnostics = notification["params"]["diagnostics"].as_array().unwrap();
    assert!(diagnostics.is_empty(), "expected the fix to clear diagnostics, got: {diagnostics:?}");
}

/// didClose publishes an empty diagnostics set for the closed document.
#[tokio::test]
async fn did_close_clears_diagnostics() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    client.did_open(&uri, "jsonnet", 1, "local x = 1; 42").await;
    tokio::time::sleep(Duration::from_millis(50)).await; // before the debounce fires

    client.did_close(&uri).await;
    let notification = client
        .recv_notification("textDocument/publishDiagnostics")
        .await;
    let diagnostics = notification["params"]["diagnostics"].as_array().unwrap();
    assert!(diagnostics.is_empty(), "expected empty diagnostics after close");
}

/// A syntax error surfaces as a `ParseError` diagnostic instead of a lint finding.
#[tokio::test]
async fn parse_error_produces_diagnostic() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let notification = open_and_collect(&mut client, &uri, "local x = ").await;

    let diagnostics = notification["params"]["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1, "expected a single parse error, got: {diagnostics:?}");
    assert_eq!(diagnostics[0]["code"], "ParseError");
}

/// Arity mismatches on a stdlib call report `ArgumentCardinality`.
#[tokio::test]
async fn stdlib_arity_mismatch_triggers_diagnostic() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let notification = open_and_collect(&mut client, &uri, "std.endsWith('')").await;

    let diagnostics = notification["params"]["diagnostics"].as_array().unwrap();
    let codes: Vec<_> = diagnostics.iter().filter_map(|d| d["code"].as_str()).collect();
    assert!(
        codes.contains(&"ArgumentCardinality"),
        "expected ArgumentCardinality, got: {codes:?}"
    );
}

/// didOpen for a non-`file://` URI is handled without a panic.
#[tokio::test]
async fn non_file_uri_handled_gracefully() {
    let mut client = TestClient::new();
    client.initialize().await;

    client
        .did_open("untitled:Untitled-1", "jsonnet", 1, "local x = 1; x")
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.shutdown().await;
}
