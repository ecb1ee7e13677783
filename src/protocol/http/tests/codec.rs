use crate::protocol::http::StatusCode;
use crate::protocol::http::codec::{HttpCodec, HttpCodecError, MessageKind};

#[test]
fn test_decode_simple_response() {
    let mut codec = HttpCodec::new();
    codec.feed(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();

    let response = codec.decode().unwrap().unwrap();
    assert_eq!(response.version, "HTTP/1.1");
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(response.reason, "No Content");
    assert!(!response.is_event());
    assert!(response.body.is_empty());
}

#[test]
fn test_decode_response_with_body() {
    let mut codec = HttpCodec::new();
    codec
        .feed(
            b"HTTP/1.1 200 OK\r\n\
              Content-Type: application/hap+json\r\n\
              Content-Length: 5\r\n\
              \r\n\
              hello",
        )
        .unwrap();

    let response = codec.decode().unwrap().unwrap();
    assert_eq!(response.headers.content_type(), Some("application/hap+json"));
    assert_eq!(response.body, b"hello");
}

#[test]
fn test_decode_event() {
    let mut codec = HttpCodec::new();
    let body = br#"{"characteristics":[{"aid":1,"iid":9,"value":20.5}]}"#;
    let message = format!(
        "EVENT/1.0 200 OK\r\nContent-Type: application/hap+json\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    codec.feed(message.as_bytes()).unwrap();
    codec.feed(body).unwrap();

    let event = codec.decode().unwrap().unwrap();
    assert!(event.is_event());
    assert_eq!(event.body, body);
}

#[test]
fn test_decode_incremental() {
    let mut codec = HttpCodec::new();

    codec.feed(b"HTTP/1.1 200 ").unwrap();
    assert!(codec.decode().unwrap().is_none());

    codec.feed(b"OK\r\nContent-Length: 4\r\n").unwrap();
    assert!(codec.decode().unwrap().is_none());

    codec.feed(b"\r\nab").unwrap();
    assert!(codec.decode().unwrap().is_none());

    codec.feed(b"cd").unwrap();
    assert_eq!(codec.decode().unwrap().unwrap().body, b"abcd");
    assert_eq!(codec.buffered_len(), 0);
}

#[test]
fn test_decode_back_to_back_messages() {
    let mut codec = HttpCodec::new();
    codec
        .feed(
            b"HTTP/1.1 204 No Content\r\n\r\n\
              EVENT/1.0 200 OK\r\nContent-Length: 2\r\n\r\n{}\
              HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nx",
        )
        .unwrap();

    assert_eq!(codec.decode().unwrap().unwrap().status.as_u16(), 204);
    assert!(codec.decode().unwrap().unwrap().is_event());
    assert_eq!(codec.decode().unwrap().unwrap().body, b"x");
    assert!(codec.decode().unwrap().is_none());
}

#[test]
fn test_decode_chunked() {
    let mut codec = HttpCodec::new();
    codec
        .feed(
            b"HTTP/1.1 200 OK\r\n\
              Transfer-Encoding: chunked\r\n\
              \r\n\
              5\r\nhello\r\n\
              7;ext=1\r\n, world\r\n",
        )
        .unwrap();
    assert!(codec.decode().unwrap().is_none());

    codec.feed(b"0\r\nX-Trailer: 1\r\n\r\n").unwrap();
    let response = codec.decode().unwrap().unwrap();
    assert_eq!(response.body, b"hello, world");
    assert_eq!(codec.buffered_len(), 0);
}

#[test]
fn test_decode_chunked_split_inside_chunk() {
    let mut codec = HttpCodec::new();
    codec
        .feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nA\r\n01234")
        .unwrap();
    assert!(codec.decode().unwrap().is_none());
    codec.feed(b"56789\r\n0\r\n\r\n").unwrap();
    assert_eq!(codec.decode().unwrap().unwrap().body, b"0123456789");
}

#[test]
fn test_decode_invalid_chunk_size() {
    let mut codec = HttpCodec::new();
    codec
        .feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n")
        .unwrap();
    assert!(matches!(codec.decode(), Err(HttpCodecError::InvalidChunk(_))));
}

#[test]
fn test_decode_invalid_status_line() {
    let mut codec = HttpCodec::new();
    codec.feed(b"RTSP/1.0 200 OK\r\n\r\n").unwrap();
    assert!(matches!(
        codec.decode(),
        Err(HttpCodecError::InvalidStatusLine(_))
    ));

    let mut codec = HttpCodec::new();
    codec.feed(b"HTTP/1.1 abc OK\r\n\r\n").unwrap();
    assert!(codec.decode().is_err());
}

#[test]
fn test_decode_invalid_content_length() {
    let mut codec = HttpCodec::new();
    codec
        .feed(b"HTTP/1.1 200 OK\r\nContent-Length: many\r\n\r\n")
        .unwrap();
    assert!(matches!(
        codec.decode(),
        Err(HttpCodecError::InvalidContentLength)
    ));
}

#[test]
fn test_message_size_limit() {
    let mut codec = HttpCodec::new().with_max_size(64);
    codec
        .feed(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n")
        .unwrap();
    assert!(matches!(
        codec.decode(),
        Err(HttpCodecError::MessageTooLarge { size: 1000, max: 64 })
    ));

    let mut codec = HttpCodec::new().with_max_size(8);
    assert!(codec.feed(&[b'x'; 9]).is_err());
}

#[test]
fn test_reset() {
    let mut codec = HttpCodec::new();
    codec.feed(b"HTTP/1.1 200 OK\r\nContent-").unwrap();
    codec.reset();
    assert_eq!(codec.buffered_len(), 0);
    codec.feed(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
    assert!(codec.decode().unwrap().is_some());
}

#[test]
fn test_oversized_chunk_size_is_rejected() {
    let mut codec = HttpCodec::new();
    codec
        .feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n1\r\nA\r\nffffffffffffffff\r\n")
        .unwrap();
    assert!(matches!(
        codec.decode(),
        Err(HttpCodecError::MessageTooLarge { .. })
    ));
    assert_eq!(codec.skip_malformed(), Some(MessageKind::Response));
    assert_eq!(codec.buffered_len(), 0);
}

#[test]
fn test_skip_malformed_keeps_next_message() {
    let mut codec = HttpCodec::new();
    codec
        .feed(b"HTTP/1.1 500 Internal\r\nBadHeader\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n")
        .unwrap();

    assert!(matches!(codec.decode(), Err(HttpCodecError::InvalidHeader(_))));
    assert_eq!(codec.skip_malformed(), Some(MessageKind::Response));

    let next = codec.decode().unwrap().unwrap();
    assert_eq!(next.status, StatusCode::NO_CONTENT);
    assert!(codec.decode().unwrap().is_none());
}

#[test]
fn test_skip_malformed_event() {
    let mut codec = HttpCodec::new();
    codec
        .feed(b"EVENT/1.0 200 OK\r\nContent-Length: x\r\n\r\n")
        .unwrap();

    assert!(codec.decode().is_err());
    assert_eq!(codec.skip_malformed(), Some(MessageKind::Event));
    assert_eq!(codec.buffered_len(), 0);
}

#[test]
fn test_skip_unparsable_status_line() {
    let mut codec = HttpCodec::new();
    codec
        .feed(b"garbage line\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
        .unwrap();

    assert!(codec.decode().is_err());
    assert_eq!(codec.skip_malformed(), None);
    assert_eq!(codec.decode().unwrap().unwrap().body, b"ok");
}
