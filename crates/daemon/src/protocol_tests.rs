// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn request_minimal_shape() {
    let req: Request = serde_json::from_str(r#"{"op": "ping"}"#).unwrap();
    assert_eq!(req.op, "ping");
    assert!(req.args.is_null());
    assert!(req.id.is_none());
}

#[test]
fn request_with_args_and_id() {
    let req: Request =
        serde_json::from_str(r#"{"op": "send", "args": {"group_id": "g_x"}, "id": "42"}"#).unwrap();
    assert_eq!(req.args["group_id"], "g_x");
    assert_eq!(req.id.as_deref(), Some("42"));
}

#[test]
fn ok_response_shape() {
    let resp = Response::ok(serde_json::json!({"n": 1})).with_id(Some("7".to_string()));
    let line = serde_json::to_string(&resp).unwrap();
    let v: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(v["ok"], true);
    assert_eq!(v["result"]["n"], 1);
    assert_eq!(v["id"], "7");
    assert!(v.get("error").is_none());
}

#[test]
fn error_response_shape() {
    let resp = Response::error_with_details(
        codes::VERSION_CONFLICT,
        "stale",
        serde_json::json!({"expected_version": 1, "current_version": 2}),
    );
    let v: serde_json::Value = serde_json::to_value(&resp).unwrap();
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"]["code"], "version_conflict");
    assert_eq!(v["error"]["message"], "stale");
    assert_eq!(v["error"]["details"]["current_version"], 2);
    assert!(v.get("result").is_none());
}

#[test]
fn error_without_details_omits_field() {
    let v = serde_json::to_value(Response::error(codes::GROUP_NOT_FOUND, "nope")).unwrap();
    assert!(v["error"].get("details").is_none());
}

#[tokio::test]
async fn read_request_parses_one_line() {
    let data = b"{\"op\": \"ping\"}\n{\"op\": \"next\"}\n";
    let mut reader = tokio::io::BufReader::new(&data[..]);
    let first = read_request(&mut reader).await.unwrap();
    assert_eq!(first.op, "ping");
    let second = read_request(&mut reader).await.unwrap();
    assert_eq!(second.op, "next");
    assert!(matches!(
        read_request(&mut reader).await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn write_json_is_line_delimited() {
    let mut buf = Vec::new();
    write_json(&mut buf, &Response::ok(serde_json::json!({}))).await.unwrap();
    write_json(&mut buf, &Response::ok(serde_json::json!({}))).await.unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.ends_with('\n'));
}

#[tokio::test]
async fn malformed_line_is_a_json_error() {
    let data = b"not json\n";
    let mut reader = tokio::io::BufReader::new(&data[..]);
    assert!(matches!(
        read_request(&mut reader).await,
        Err(ProtocolError::Json(_))
    ));
}
