mod common;

use std::time::Duration;

use common::lsp_client::{TestClient, file_uri};

fn doc_uri() -> String {
    file_uri("/tmp/lsp-completion-test.jsonnet")
}

async fn open_and_wait(client: &mut TestClient, uri: &str, content: &str) {
    client.did_open(uri, "jsonnet", 1, content).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    client
        .recv_notification("textDocument/publishDiagnostics")
        .await;
}

fn labels(result: &serde_json::Value) -> Vec<String> {
    result
        .as_array()
        .unwrap_or(&vec![])
        .iter()
        .map(|item| item["label"].as_str().unwrap().to_string())
        .collect()
}

/// Variables in scope at the cursor are offered as completions.
#[tokio::test]
async fn completion_offers_locals_in_scope() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let content = "local greeting = 'hi'; local count = 1; ";
    open_and_wait(&mut client, &uri, content).await;

    let cursor_col = content.len() as u32;
    let result = client.completion(&uri, 0, cursor_col).await;

    let names = labels(&result);
    assert!(names.contains(&"greeting".to_string()), "got: {names:?}");
    assert!(names.contains(&"count".to_string()), "got: {names:?}");
}

/// Typing `std.` offers the stdlib's member names.
#[tokio::test]
async fn completion_after_std_dot_lists_stdlib_members() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let content = "std.";
    open_and_wait(&mut client, &uri, content).await;

    let id = 99;
    client
        .send(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "textDocument/completion",
            "params": {
                "textDocument": { "uri": uri },
                "position": { "line": 0, "character": content.len() },
                "context": { "triggerKind": 2, "triggerCharacter": "." }
            }
        }))
        .await;
    let response = loop {
        let msg = client.recv().await;
        if msg.get("id") == Some(&serde_json::json!(id)) && msg.get("method").is_none() {
            break msg;
        }
    };

    let names = labels(&response["result"]);
    assert!(names.contains(&"endsWith".to_string()), "got: {names:?}");
    assert!(names.contains(&"all".to_string()), "got: {names:?}");
}

/// Fields deduced on an object literal are offered after a `.`.
#[tokio::test]
async fn completion_after_dot_lists_object_fields() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let content = "local obj = {name: 'a', age: 1}; obj.";
    open_and_wait(&mut client, &uri, content).await;

    let cursor_col = content.len() as u32;
    let result = client.completion(&uri, 0, cursor_col).await;

    let names = labels(&result);
    assert!(names.contains(&"name".to_string()), "got: {names:?}");
    assert!(names.contains(&"age".to_string()), "got: {names:?}");
}

/// Completing inside a `template + {}` body offers the template's unassigned fields
/// as snippets, not already-assigned ones.
#[tokio::test]
async fn completion_inside_template_plus_object_offers_unassigned_fields() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let content = "local base = {name: 'a', age: 1}; base + {name: 'b', }";
    open_and_wait(&mut client, &uri, content).await;

    // Cursor right before the closing brace, after the trailing comma.
    let cursor_col = (content.len() - 1) as u32;
    let result = client.completion(&uri, 0, cursor_col).await;

    let names = labels(&result);
    assert!(names.contains(&"age".to_string()), "got: {names:?}");
    assert!(!names.contains(&"name".to_string()), "'name' is already assigned: {names:?}");
}
