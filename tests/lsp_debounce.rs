mod common;

use std::time::Duration;

use common::lsp_client::{TestClient, file_uri};

fn doc_uri() -> String {
    file_uri("/tmp/lsp-debounce-test.jsonnet")
}

/// Rapid edits: 10 didChange events in quick succession should produce only one
/// publishDiagnostics notification after the debounce window expires.
///
/// With `start_paused = true`, tokio's clock is frozen until we advance it.
/// All spawned tasks sleep in the debounce; we control exactly when they wake.
#[tokio::test(start_paused = true)]
async fn rapid_edits_produce_single_diagnostic_notification() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();

    // Open with the first version — clean.
    client.did_open(&uri, "jsonnet", 1, "local x = 1; x").await;
    tokio::task::yield_now().await;

    // Send 9 more rapid edits (versions 2-10), alternating clean/unused-var content.
    for v in 2..=10i32 {
        let content = if v % 2 == 0 {
            format!("local x{v} = {v}; 42") // unused local
        } else {
            format!("local x{v} = {v}; x{v}")
        };
        client.did_change(&uri, v, &content).await;
        tokio::task::yield_now().await;
    }

    // Version 10 has an unused local (v=10, even), so the final result should have findings.
    tokio::time::advance(Duration::from_millis(250)).await;
    tokio::task::yield_now().await;

    // Exactly ONE publishDiagnostics notification should arrive — every version-guarded
    // task for a stale version self-discards inside the worker.
    let notification = client
        .recv_notification("textDocument/publishDiagnostics")
        .await;
    let uri_in_notification = notification["params"]["uri"].as_str().unwrap();
    assert_eq!(uri_in_notification, doc_uri());

    let diagnostics = notification["params"]["diagnostics"].as_array().unwrap();
    assert!(
        !diagnostics.is_empty(),
        "expected a finding for the final (unused-local) version"
    );
    assert_eq!(diagnostics[0]["code"], "UnusedVar");
}

/// did_close during in-flight validation: close the document while the debounce
/// is sleeping; the debounced task should find the document gone and discard.
#[tokio::test(start_paused = true)]
async fn did_close_during_debounce_discards_result() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();

    client.did_open(&uri, "jsonnet", 1, "local x = 1; x").await;
    tokio::task::yield_now().await;

    // Close before the debounce fires.
    client.did_close(&uri).await;
    tokio::task::yield_now().await;

    // didClose immediately publishes empty diagnostics.
    let close_notif = client
        .recv_notification("textDocument/publishDiagnostics")
        .await;
    assert_eq!(
        close_notif["params"]["diagnostics"].as_array().unwrap().len(),
        0,
        "expected empty diagnostics on close"
    );

    // Advance past the debounce — the in-flight task's version guard should fail
    // (the overlay no longer has the file) and it should publish nothing further.
    tokio::time::advance(Duration::from_millis(250)).await;
    tokio::task::yield_now().await;

    // The server stays responsive, confirming the discarded task didn't panic.
    client.shutdown().await;
}
