mod common;

use std::time::Duration;

use common::lsp_client::{TestClient, file_uri};

fn doc_uri() -> String {
    file_uri("/tmp/lsp-hover-test.jsonnet")
}

async fn open_and_wait(client: &mut TestClient, uri: &str, content: &str) {
    client.did_open(uri, "jsonnet", 1, content).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    client
        .recv_notification("textDocument/publishDiagnostics")
        .await;
}

/// Hovering a number literal shows its deduced type in a markdown code block.
#[tokio::test]
async fn hover_on_number_literal_shows_type() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let content = "local x = 42; x";
    open_and_wait(&mut client, &uri, content).await;

    // Hover over `x` at the use site (end of the string).
    let result = client.hover(&uri, 0, (content.len() - 1) as u32).await;

    let value = result["contents"]["value"].as_str().expect("expected markdown contents");
    assert!(value.contains("number"), "expected the number type in hover, got: {value}");
}

/// Hovering a parameter annotated with a type comment reports that type.
#[tokio::test]
async fn hover_on_annotated_parameter_shows_declared_type() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let content = "local f(a/*:string*/) = a; f('x')";
    open_and_wait(&mut client, &uri, content).await;

    // Hover over the `a` use inside the function body (right after "local f(a/*:string*/) = ").
    let col = content.find(") = a").unwrap() as u32 + 4;
    let result = client.hover(&uri, 0, col).await;

    let value = result["contents"]["value"].as_str().expect("expected markdown contents");
    assert!(value.contains("string"), "expected the annotated type in hover, got: {value}");
}

/// A doc comment immediately above a binding is appended to its hover text.
#[tokio::test]
async fn hover_includes_doc_comment() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let content = "local\n  // The answer.\n  x = 42;\nx";
    open_and_wait(&mut client, &uri, content).await;

    let last_line = content.lines().last().unwrap();
    let last_line_idx = (content.lines().count() - 1) as u32;
    let result = client.hover(&uri, last_line_idx, (last_line.len() - 1) as u32).await;

    let value = result["contents"]["value"].as_str().expect("expected markdown contents");
    assert!(value.contains("The answer."), "expected doc comment in hover, got: {value}");
}

/// Hovering over whitespace with nothing underneath returns no hover.
#[tokio::test]
async fn hover_outside_any_node_returns_none() {
    let mut client = TestClient::new();
    client.initialize().await;

    let uri = doc_uri();
    let content = "local x = 1;\n\nx";
    open_and_wait(&mut client, &uri, content).await;

    let result = client.hover(&uri, 1, 0).await;
    assert!(result.is_null(), "expected no hover on a blank line, got: {result}");
}
