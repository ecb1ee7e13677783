use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::*;
use crate::model::DeviceReportedInfo;
use crate::protocol::http::{HttpCodec, HttpRequest, StatusCode};

#[test]
fn test_fixtures_decode() {
    let sensor = DeviceReportedInfo::from_json(TEMPERATURE_SENSOR_ACCESSORIES.as_bytes()).unwrap();
    assert_eq!(sensor.readable_ids().len(), 6);
    assert_eq!(sensor.event_ids().len(), 1);

    let lamp = DeviceReportedInfo::from_json(LIGHTBULB_ACCESSORIES.as_bytes()).unwrap();
    assert_eq!(lamp.event_ids().len(), 2);
}

#[tokio::test]
async fn test_plaintext_requests_need_authorization() {
    let mut accessory = MockAccessory::temperature_sensor();
    let address = accessory.start().await.unwrap();

    let mut stream = TcpStream::connect(address).await.unwrap();
    let request = HttpRequest::get("/accessories").host(&address.to_string()).build();
    stream.write_all(&request.encode()).await.unwrap();

    let mut codec = HttpCodec::new();
    let mut buf = [0u8; 1024];
    let response = loop {
        if let Some(response) = codec.decode().unwrap() {
            break response;
        }
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "accessory closed early");
        codec.feed(&buf[..n]).unwrap();
    };

    assert_eq!(response.status, StatusCode::CONNECTION_AUTHORIZATION_REQUIRED);
    assert_eq!(
        accessory.received_requests().await,
        vec!["GET /accessories".to_string()]
    );
}

#[tokio::test]
async fn test_stop_closes_connections() {
    let mut accessory = MockAccessory::temperature_sensor();
    let address = accessory.start().await.unwrap();

    let mut stream = TcpStream::connect(address).await.unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while accessory.connection_count().await == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    accessory.stop();
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(std::time::Duration::from_secs(2), stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}
