//! End-to-end protocol tests - drive the line-delimited server loop with
//! in-memory streams, the way a host would over stdio.
//!
//! Run with: cargo test --test protocol_tests

use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use culturabuilder::mcp::{codes, CommandHandler, McpServer};
use culturabuilder::{Catalog, CommandDescriptor, UsageMetrics};

// ============================================================================
// HELPERS
// ============================================================================

fn build_catalog() -> Catalog {
    Catalog::new(vec![CommandDescriptor::new("/cb:build", "Builds")
        .with_arguments(["target"])
        .with_examples(["/cb:build frontend"])])
    .unwrap()
}

/// Feed JSON messages (one per line) and collect the parsed response lines
fn exchange(handler: CommandHandler, messages: &[Value]) -> Vec<Value> {
    let input: String = messages
        .iter()
        .map(|m| format!("{}\n", m))
        .collect();

    let server = McpServer::new(handler);
    let mut output = Vec::new();
    server
        .serve(Cursor::new(input.into_bytes()), &mut output)
        .expect("serve should stop cleanly at EOF");

    String::from_utf8(output)
        .expect("responses are UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("each response line is JSON"))
        .collect()
}

fn list_request(id: i64) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": "tools/list", "params": {}})
}

fn call_request(id: i64, name: &str, args: &[&str]) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": {"args": args}}
    })
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn single_command_catalog_scenario() {
    let responses = exchange(
        CommandHandler::new(build_catalog()),
        &[
            list_request(1),
            call_request(2, "/cb:build", &["frontend"]),
            call_request(3, "/cb:unknown", &[]),
        ],
    );
    assert_eq!(responses.len(), 3);

    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], json!("/cb:build"));

    let text = responses[1]["result"]["content"][0]["text"]
        .as_str()
        .unwrap();
    assert!(text.contains("Builds"));
    assert!(text.contains("/cb:build frontend"));

    assert!(responses[2].get("result").is_none());
    assert_eq!(responses[2]["error"]["code"], json!(codes::INTERNAL_ERROR));
    assert_eq!(
        responses[2]["error"]["message"],
        json!("Comando não encontrado: /cb:unknown")
    );
    assert_eq!(responses[2]["error"]["data"]["name"], json!("/cb:unknown"));
}

#[test]
fn empty_catalog_scenario() {
    let responses = exchange(
        CommandHandler::new(Catalog::empty()),
        &[
            list_request(1),
            call_request(2, "/cb:build", &[]),
            call_request(3, "/cb:help", &[]),
        ],
    );

    assert_eq!(responses[0]["result"], json!({"tools": []}));
    assert!(responses[1]["error"].is_object());
    assert!(responses[2]["error"].is_object());
}

#[test]
fn full_handshake_with_builtin_catalog() {
    let responses = exchange(
        CommandHandler::new(Catalog::builtin()),
        &[
            json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "test-host", "version": "0.0.1"}
                }
            }),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            list_request(1),
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
        ],
    );

    // The notification produces no line
    assert_eq!(responses.len(), 3);
    assert_eq!(
        responses[0]["result"]["serverInfo"]["name"],
        json!("culturabuilder")
    );
    assert_eq!(
        responses[1]["result"]["tools"].as_array().unwrap().len(),
        17
    );
    assert_eq!(responses[2], json!({"jsonrpc": "2.0", "id": 2, "result": {}}));
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[test]
fn discovery_is_idempotent_and_order_stable() {
    let responses = exchange(
        CommandHandler::new(Catalog::builtin()),
        &[list_request(1), list_request(2)],
    );
    assert_eq!(responses[0]["result"], responses[1]["result"]);
}

#[test]
fn discovery_names_equal_invocable_identifiers() {
    let catalog = Catalog::builtin();
    let candidates: Vec<String> = catalog
        .identifiers()
        .map(String::from)
        .chain(["/cb:nope", "/CB:BUILD", "build", ""].map(String::from))
        .collect();

    let mut messages = vec![list_request(0)];
    for (i, name) in candidates.iter().enumerate() {
        messages.push(call_request(i as i64 + 1, name, &[]));
    }
    let responses = exchange(CommandHandler::new(catalog), &messages);

    let discovered: BTreeSet<String> = responses[0]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();

    let accepted: BTreeSet<String> = candidates
        .iter()
        .zip(&responses[1..])
        .filter(|(_, response)| response.get("result").is_some())
        .map(|(name, _)| name.clone())
        .collect();

    assert_eq!(discovered, accepted);
}

#[test]
fn every_builtin_response_contains_description_and_examples() {
    let catalog = Catalog::builtin();
    let commands = catalog.list_all().to_vec();
    let messages: Vec<Value> = commands
        .iter()
        .enumerate()
        .map(|(i, c)| call_request(i as i64, &c.identifier, &[]))
        .collect();

    let responses = exchange(CommandHandler::new(catalog), &messages);

    for (command, response) in commands.iter().zip(&responses) {
        let content = response["result"]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1, "{}", command.identifier);
        let text = content[0]["text"].as_str().unwrap();
        assert!(text.contains(&command.description));
        for example in &command.examples {
            assert!(text.contains(example.as_str()), "missing example {}", example);
        }
    }
}

// ============================================================================
// ROBUSTNESS
// ============================================================================

#[test]
fn errors_do_not_stop_the_loop() {
    let input = concat!(
        "this is not json\n",
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"/cb:build","arguments":{"args":[1]}}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"no/such/method"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"/cb:build"}}"#,
        "\n"
    );

    let server = McpServer::new(CommandHandler::new(build_catalog()));
    let mut output = Vec::new();
    server.serve(Cursor::new(input), &mut output).unwrap();

    let responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["error"]["code"], json!(codes::PARSE_ERROR));
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[1]["error"]["code"], json!(codes::INVALID_PARAMS));
    assert_eq!(responses[2]["error"]["code"], json!(codes::METHOD_NOT_FOUND));
    assert!(responses[3]["result"]["content"].is_array());
}

#[test]
fn invalid_utf8_frame_does_not_stop_the_loop() {
    let mut input = br#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"/cb:build","arguments":{"args":["caf"#.to_vec();
    input.push(0xe9);
    input.extend_from_slice(b"\"]}}}\n");
    input.extend_from_slice(br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#);
    input.push(b'\n');

    let server = McpServer::new(CommandHandler::new(build_catalog()));
    let mut output = Vec::new();
    server
        .serve(Cursor::new(input), &mut output)
        .expect("a bad frame is not a stream failure");

    let responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["code"], json!(codes::PARSE_ERROR));
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[1], json!({"jsonrpc": "2.0", "id": 2, "result": {}}));
}

#[test]
fn null_id_request_is_answered_absent_id_is_not() {
    let responses = exchange(
        CommandHandler::new(build_catalog()),
        &[
            json!({"jsonrpc": "2.0", "id": null, "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": 5, "method": "ping"}),
        ],
    );

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[0]["result"]["tools"][0]["name"], json!("/cb:build"));
    assert_eq!(responses[1]["id"], json!(5));
}

#[test]
fn invocations_are_recorded_in_metrics() {
    let metrics = Arc::new(UsageMetrics::new());
    let handler = CommandHandler::new(build_catalog()).with_metrics(metrics.clone());

    exchange(
        handler,
        &[
            call_request(1, "/cb:build", &["frontend", "--optimize"]),
            call_request(2, "/cb:build", &["--optimize=full"]),
            call_request(3, "/cb:ghost", &[]),
        ],
    );

    let summary = metrics.summary();
    assert_eq!(summary.total_commands, 2);
    assert_eq!(summary.total_flags_used, 2);
    assert_eq!(summary.total_errors, 1);
    assert_eq!(summary.top_flags[0].name, "--optimize");
}
