mod common;

use std::time::Duration;

use common::lsp_client::{TestClient, file_uri};

fn doc_uri() -> String {
    file_uri("/tmp/lsp-encoding-test.jsonnet")
}

/// Without a client opt-in, the server negotiates UTF-16 positions (the LSP default).
#[tokio::test]
async fn defaults_to_utf16_position_encoding() {
    let mut client = TestClient::new();
    let result = client.initialize().await;

    assert_eq!(result["capabilities"]["positionEncoding"], "utf-16");
}

/// A client that advertises UTF-8 support gets UTF-8 positions back.
#[tokio::test]
async fn negotiates_utf8_when_client_supports_it() {
    let mut client = TestClient::new();
    let result = client
        .initialize_with_params(serde_json::json!({
            "general": { "positionEncodings": ["utf-8"] }
        }))
        .await;

    assert_eq!(result["capabilities"]["positionEncoding"], "utf-8");
}

/// With UTF-16 negotiated, a diagnostic after a multi-byte character is positioned
/// by UTF-16 code units, not bytes.
#[tokio::test]
async fn utf16_positions_account_for_multibyte_characters() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    // "é" is 2 bytes in UTF-8 but 1 UTF-16 code unit; "local " is 6 ASCII chars.
    let content = "local é = 1; 42";
    client.did_open(&uri, "jsonnet", 1, content).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let notification = client
        .recv_notification("textDocument/publishDiagnostics")
        .await;

    let diagnostics = notification["params"]["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    let start_char = diagnostics[0]["range"]["start"]["character"].as_u64().unwrap();
    let end_char = diagnostics[0]["range"]["end"]["character"].as_u64().unwrap();
    assert_eq!(start_char, 6, "expected UTF-16 code-unit start offset, got {start_char}");
    // `é` is a single UTF-16 code unit, so the span is exactly one character wide.
    assert_eq!(end_char, 7, "expected UTF-16 code-unit end offset, got {end_char}");
}

/// With UTF-8 negotiated, the same content is positioned by byte offset instead.
#[tokio::test]
async fn utf8_positions_use_byte_offsets() {
    let mut client = TestClient::new();
    client
        .initialize_with_params(serde_json::json!({
            "general": { "positionEncodings": ["utf-8"] }
        }))
        .await;

    let uri = doc_uri();
    let content = "local é = 1; 42";
    client.did_open(&uri, "jsonnet", 1, content).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let notification = client
        .recv_notification("textDocument/publishDiagnostics")
        .await;

    let diagnostics = notification["params"]["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    let start_char = diagnostics[0]["range"]["start"]["character"].as_u64().unwrap();
    let end_char = diagnostics[0]["range"]["end"]["character"].as_u64().unwrap();
    assert_eq!(start_char, 6, "byte offset of 'é' in UTF-8 source is also 6");
    // `é` is 2 bytes in UTF-8, unlike the single UTF-16 code unit above.
    assert_eq!(end_char, 8, "expected byte-offset end, got {end_char}");
}
