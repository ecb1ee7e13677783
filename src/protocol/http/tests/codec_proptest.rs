use proptest::prelude::*;

use crate::protocol::http::codec::HttpCodec;
use crate::protocol::http::server_codec::HttpServerCodec;

proptest! {
    #[test]
    fn test_codec_no_panic_on_random_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let mut codec = HttpCodec::new();
        let _ = codec.feed(&bytes);
        while let Ok(Some(_)) = codec.decode() {}

        let mut server = HttpServerCodec::new();
        server.feed(&bytes);
        let _ = server.decode();
    }

    #[test]
    fn test_codec_no_panic_on_random_chunked(chunks in proptest::collection::vec("[ -~]{0,40}", 0..8)) {
        let mut message = String::from("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");
        for chunk in &chunks {
            message.push_str(&format!("{:x}\r\n{}\r\n", chunk.len(), chunk));
        }
        message.push_str("0\r\n\r\n");

        let mut codec = HttpCodec::new();
        codec.feed(message.as_bytes()).unwrap();
        let response = codec.decode().unwrap().unwrap();
        prop_assert_eq!(response.body, chunks.concat().into_bytes());
    }

    #[test]
    fn test_body_survives_any_split(body in proptest::collection::vec(any::<u8>(), 0..300), split in 0usize..400) {
        let mut message = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
        message.extend_from_slice(&body);
        let split = split.min(message.len());

        let mut codec = HttpCodec::new();
        codec.feed(&message[..split]).unwrap();
        let early = codec.decode().unwrap();
        codec.feed(&message[split..]).unwrap();
        let response = match early {
            Some(response) => response,
            None => codec.decode().unwrap().unwrap(),
        };
        prop_assert_eq!(response.body, body);
    }
}
