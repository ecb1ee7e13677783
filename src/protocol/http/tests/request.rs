use serde_json::json;

use crate::protocol::http::{HttpRequest, HttpResponse, Method, StatusCode};

#[test]
fn test_request_encode_get() {
    let request = HttpRequest::get("/characteristics?id=1.9,1.3")
        .host("192.168.1.20:51826")
        .build();

    let encoded = String::from_utf8(request.encode()).unwrap();
    assert!(encoded.starts_with("GET /characteristics?id=1.9,1.3 HTTP/1.1\r\n"));
    assert!(encoded.contains("Host: 192.168.1.20:51826\r\n"));
    assert!(!encoded.contains("Content-Length"));
    assert!(encoded.ends_with("\r\n\r\n"));
}

#[test]
fn test_request_encode_json_body() {
    let request = HttpRequest::put("/characteristics")
        .body_json(&json!({"characteristics": [{"aid": 1, "iid": 9, "ev": true}]}))
        .unwrap()
        .build();

    let encoded = request.encode();
    let text = String::from_utf8_lossy(&encoded);
    assert!(text.contains("Content-Type: application/hap+json\r\n"));
    assert!(text.contains(&format!("Content-Length: {}\r\n", request.body.len())));
    assert!(encoded.ends_with(&request.body));
}

#[test]
fn test_request_encode_empty_post_has_length() {
    let request = HttpRequest::post("/identify").build();
    let text = String::from_utf8(request.encode()).unwrap();
    assert!(text.contains("Content-Length: 0\r\n"));
}

#[test]
fn test_request_tlv_body() {
    let request = HttpRequest::post("/pair-verify").body_tlv(vec![6, 1, 1]).build();
    assert_eq!(
        request.headers.content_type(),
        Some("application/pairing+tlv8")
    );
    assert_eq!(request.body, vec![6, 1, 1]);
}

#[test]
fn test_request_route_and_query() {
    let request = HttpRequest::get("/characteristics?id=1.9&ev=1").build();
    assert_eq!(request.route(), "/characteristics");
    assert_eq!(request.query("id"), Some("1.9"));
    assert_eq!(request.query("ev"), Some("1"));
    assert_eq!(request.query("meta"), None);

    let request = HttpRequest::get("/accessories").build();
    assert_eq!(request.route(), "/accessories");
    assert_eq!(request.query("id"), None);
}

#[test]
fn test_method_round_trip() {
    for method in [Method::Get, Method::Put, Method::Post, Method::Delete] {
        assert_eq!(method.as_str().parse::<Method>(), Ok(method));
    }
    assert!("PATCH".parse::<Method>().is_err());
}

#[test]
fn test_response_encode_event() {
    let event = HttpResponse::event(b"{}".to_vec());
    let text = String::from_utf8(event.encode()).unwrap();
    assert!(text.starts_with("EVENT/1.0 200 OK\r\n"));
    assert!(text.contains("Content-Length: 2\r\n"));
    assert!(text.ends_with("\r\n\r\n{}"));
}

#[test]
fn test_response_json() {
    let response = HttpResponse::new(StatusCode::OK)
        .with_body("application/hap+json", br#"{"a":1}"#.to_vec());
    let value: serde_json::Value = response.json().unwrap();
    assert_eq!(value, json!({"a": 1}));
    assert!(response.is_success());
    assert!(!HttpResponse::new(StatusCode::NOT_FOUND).is_success());
}

#[test]
fn test_headers_case_insensitive() {
    let request = HttpRequest::get("/")
        .header("content-type", "a")
        .header("Content-Type", "b")
        .build();
    assert_eq!(request.headers.len(), 1);
    assert_eq!(request.headers.get("CONTENT-TYPE"), Some("b"));
}

#[test]
fn test_chunked_detection() {
    let mut response = HttpResponse::new(StatusCode::OK);
    response.headers.insert("Transfer-Encoding", "gzip, Chunked");
    assert!(response.headers.is_chunked());
    response.headers.insert("Transfer-Encoding", "chunked, gzip");
    assert!(!response.headers.is_chunked());
}
