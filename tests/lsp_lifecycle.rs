mod common;

use common::lsp_client::TestClient;

/// Verifies the server completes the initialize / initialized / shutdown handshake.
#[tokio::test]
async fn initialize_and_shutdown() {
    let mut client = TestClient::new();
    let result = client.initialize().await;

    // Server advertises incremental sync and reports its name.
    assert_eq!(
        result["capabilities"]["textDocumentSync"],
        serde_json::json!(2) // TextDocumentSyncKind::INCREMENTAL = 2
    );
    assert_eq!(result["serverInfo"]["name"], "jsonnet-ls");

    client.shutdown().await;
}

/// Verifies completion, hover, signature help, definition and document symbols
/// are all advertised as supported.
#[tokio::test]
async fn advertises_query_surface_capabilities() {
    let mut client = TestClient::new();
    let result = client.initialize().await;

    let caps = &result["capabilities"];
    assert!(caps["completionProvider"].is_object());
    assert_eq!(caps["hoverProvider"], serde_json::json!(true));
    assert!(caps["signatureHelpProvider"].is_object());
    assert_eq!(caps["definitionProvider"], serde_json::json!(true));
    assert_eq!(caps["documentSymbolProvider"], serde_json::json!(true));

    client.shutdown().await;
}
