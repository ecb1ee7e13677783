//! Mock `HomeKit` accessory for testing purposes.
//!
//! Listens on a local TCP port and speaks enough HAP to exercise a controller: pair-setup,
//! pair-verify, the encrypted `/accessories`, `/characteristics` and `/pairings`
//! endpoints, and `EVENT/1.0` pushes for subscribed characteristics. Tests drive it
//! through its methods to push values, drop connections or stop answering.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::pairing_server::{AccessorySessionKeys, PairingServer};
use crate::model::{
    CharacteristicId, CharacteristicValue, CharacteristicWrite, CharacteristicsPayload,
    DeviceReportedInfo, HapStatus,
};
use crate::net::HapSecureSession;
use crate::protocol::crypto::Ed25519KeyPair;
use crate::protocol::http::{
    HttpRequest, HttpResponse, HttpServerCodec, Method, StatusCode, content_type,
};
use crate::protocol::pairing::PairingCredential;
use crate::protocol::pairing::tlv::{TlvDecoder, TlvEncoder, TlvType, errors, methods};

/// A temperature sensor: accessory information plus one current temperature reading
/// (aid 1, iid 9, 49.0 °C) that supports events.
pub const TEMPERATURE_SENSOR_ACCESSORIES: &str = r#"{"accessories":[{"aid":1,"services":[
  {"iid":1,"type":"3E","characteristics":[
    {"iid":2,"type":"14","perms":["pw"],"format":"bool","description":"Identify"},
    {"iid":3,"type":"20","perms":["pr"],"format":"string","value":"Default-Manufacturer"},
    {"iid":4,"type":"21","perms":["pr"],"format":"string","value":"Default-Model"},
    {"iid":5,"type":"23","perms":["pr"],"format":"string","value":"Sensor1"},
    {"iid":6,"type":"30","perms":["pr"],"format":"string","value":"default"},
    {"iid":7,"type":"52","perms":["pr"],"format":"string","value":"1.0"}]},
  {"iid":8,"type":"8A","primary":true,"characteristics":[
    {"iid":9,"type":"11","perms":["pr","ev"],"format":"float","value":49.0,
     "unit":"celsius","minValue":-100,"maxValue":100,"minStep":0.1}]}
]}]}"#;

/// A dimmable lightbulb with writable `On` (iid 9) and `Brightness` (iid 10)
pub const LIGHTBULB_ACCESSORIES: &str = r#"{"accessories":[{"aid":1,"services":[
  {"iid":1,"type":"3E","characteristics":[
    {"iid":2,"type":"14","perms":["pw"],"format":"bool"},
    {"iid":3,"type":"23","perms":["pr"],"format":"string","value":"Lamp"}]},
  {"iid":8,"type":"43","primary":true,"characteristics":[
    {"iid":9,"type":"25","perms":["pr","pw","ev"],"format":"bool","value":false},
    {"iid":10,"type":"8","perms":["pr","pw","ev"],"format":"int","value":50,
     "unit":"percentage","minValue":0,"maxValue":100,"minStep":1}]}
]}]}"#;

/// Configuration for the mock accessory.
#[derive(Debug, Clone)]
pub struct MockAccessoryConfig {
    /// Pairing identifier the accessory reports.
    pub accessory_id: String,
    /// Setup code accepted by pair-setup.
    pub setup_code: String,
    /// `GET /accessories` body.
    pub accessories_json: String,
}

impl Default for MockAccessoryConfig {
    fn default() -> Self {
        Self {
            accessory_id: "AA:BB:CC:DD:EE:FF".to_string(),
            setup_code: "031-45-154".to_string(),
            accessories_json: TEMPERATURE_SENSOR_ACCESSORIES.to_string(),
        }
    }
}

enum Command {
    /// Send an `EVENT/1.0` message with this body
    Push(Vec<u8>),
    /// Send these bytes as-is through the session encryption
    Raw(Vec<u8>),
    /// Send bytes that will not authenticate
    Garbage,
    Close,
}

/// Per-connection handle kept by the accessory
struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    encrypted: bool,
    subscriptions: HashSet<CharacteristicId>,
}

/// Internal state of the mock accessory.
struct AccessoryState {
    pairing: PairingServer,
    database: DeviceReportedInfo,
    connections: HashMap<u64, Connection>,
    next_connection: u64,
    /// `METHOD path` of every request received, in order
    requests: Vec<String>,
}

/// A mock accessory.
pub struct MockAccessory {
    config: MockAccessoryConfig,
    state: Arc<Mutex<AccessoryState>>,
    shutdown: CancellationToken,
    /// Encrypted requests are held back while this is false
    responsive: watch::Sender<bool>,
    address: Option<SocketAddr>,
}

struct Reply {
    response: HttpResponse,
    keys: Option<AccessorySessionKeys>,
}

impl Reply {
    fn respond(response: HttpResponse) -> Self {
        Self {
            response,
            keys: None,
        }
    }
}

impl MockAccessory {
    /// Creates a mock accessory.
    ///
    /// # Panics
    ///
    /// Panics if `accessories_json` is not a valid accessory database.
    #[must_use]
    pub fn new(config: MockAccessoryConfig) -> Self {
        #[allow(clippy::expect_used, reason = "test fixture")]
        let database = DeviceReportedInfo::from_json(config.accessories_json.as_bytes())
            .expect("mock accessory database must be valid");
        let pairing = PairingServer::new(
            &config.accessory_id,
            Ed25519KeyPair::generate(),
            &config.setup_code,
        );

        Self {
            config,
            state: Arc::new(Mutex::new(AccessoryState {
                pairing,
                database,
                connections: HashMap::new(),
                next_connection: 0,
                requests: Vec::new(),
            })),
            shutdown: CancellationToken::new(),
            responsive: watch::channel(true).0,
            address: None,
        }
    }

    /// The temperature sensor on an ephemeral port.
    #[must_use]
    pub fn temperature_sensor() -> Self {
        Self::new(MockAccessoryConfig::default())
    }

    /// Starts accepting connections on `127.0.0.1` and returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(&mut self) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        self.address = Some(address);

        let state = Arc::clone(&self.state);
        let shutdown = self.shutdown.clone();
        let responsive = self.responsive.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!("Mock accessory accepted {}", peer);
                            let state = Arc::clone(&state);
                            let shutdown = shutdown.clone();
                            let responsive = responsive.clone();
                            tokio::spawn(serve_connection(stream, state, shutdown, responsive));
                        }
                        Err(e) => tracing::error!("Accept error: {}", e),
                    },
                }
            }
        });

        Ok(address)
    }

    /// Stops listening and drops every connection.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Returns the address the accessory is listening on.
    #[must_use]
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    #[must_use]
    pub fn accessory_id(&self) -> &str {
        &self.config.accessory_id
    }

    #[must_use]
    pub fn setup_code(&self) -> &str {
        &self.config.setup_code
    }

    /// Pair a new controller directly and return its credential.
    ///
    /// # Panics
    ///
    /// Panics if called before [`start`](Self::start).
    pub async fn pair_controller(&self, controller_id: &str) -> PairingCredential {
        let keys = Ed25519KeyPair::generate();
        let mut state = self.state.lock().await;
        state.pairing.add_pairing(controller_id, &keys.public_key());
        #[allow(clippy::expect_used, reason = "test fixture")]
        let address = self.address.expect("mock accessory not started");
        PairingCredential::new(
            controller_id,
            &keys,
            self.config.accessory_id.clone(),
            &state.pairing.public_key(),
            address,
        )
    }

    /// Whether a controller is paired.
    pub async fn is_paired(&self, controller_id: &str) -> bool {
        self.state.lock().await.pairing.is_paired(controller_id)
    }

    /// Sign pair-verify with a key other than the accessory's own.
    pub async fn impersonate_with(&self, keys: Ed25519KeyPair) {
        self.state.lock().await.pairing.impersonate_with = Some(keys);
    }

    /// Current value of a characteristic.
    pub async fn value(&self, id: CharacteristicId) -> Option<Value> {
        self.state
            .lock()
            .await
            .database
            .find_characteristic(id)
            .and_then(|c| c.value.clone())
    }

    /// Change a value locally and notify every subscribed connection.
    pub async fn set_value(&self, id: CharacteristicId, value: Value) {
        let mut state = self.state.lock().await;
        state.database.set_value(id, value.clone());
        let body = event_body(id, value);
        for connection in state.connections.values() {
            if connection.encrypted && connection.subscriptions.contains(&id) {
                let _ = connection.commands.send(Command::Push(body.clone()));
            }
        }
    }

    /// Push an arbitrary event body to every encrypted connection.
    pub async fn push_event(&self, values: Vec<CharacteristicValue>) {
        let Ok(body) = serde_json::to_vec(&CharacteristicsPayload::new(values)) else {
            return;
        };
        self.broadcast(|| Command::Push(body.clone())).await;
    }

    /// Push an `EVENT/1.0` message with an arbitrary body, valid JSON or not.
    pub async fn push_event_body(&self, body: Vec<u8>) {
        self.broadcast(|| Command::Push(body.clone())).await;
    }

    /// Send a complete message of raw bytes, encrypted, to every encrypted connection.
    ///
    /// Nothing is checked, so a malformed status line or header block goes out as is.
    pub async fn send_raw_message(&self, message: Vec<u8>) {
        self.broadcast(|| Command::Raw(message.clone())).await;
    }

    /// Send a frame that fails authentication to every encrypted connection.
    pub async fn send_garbage(&self) {
        self.broadcast(|| Command::Garbage).await;
    }

    /// Close every open connection; keep listening.
    pub async fn close_connections(&self) {
        let mut state = self.state.lock().await;
        for (_, connection) in state.connections.drain() {
            let _ = connection.commands.send(Command::Close);
        }
    }

    /// Hold back answers to encrypted requests until set responsive again.
    ///
    /// Held requests are answered in order once released, as a slow accessory would.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.responsive.send_replace(!unresponsive);
    }

    /// Every request received so far as `METHOD path`.
    pub async fn received_requests(&self) -> Vec<String> {
        self.state.lock().await.requests.clone()
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Characteristics any connection is subscribed to.
    pub async fn subscriptions(&self) -> HashSet<CharacteristicId> {
        self.state
            .lock()
            .await
            .connections
            .values()
            .flat_map(|c| c.subscriptions.iter().copied())
            .collect()
    }

    async fn broadcast(&self, command: impl Fn() -> Command) {
        let state = self.state.lock().await;
        for connection in state.connections.values().filter(|c| c.encrypted) {
            let _ = connection.commands.send(command());
        }
    }
}

impl Drop for MockAccessory {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

enum Activity {
    Stop,
    Command(Option<Command>),
    Read(std::io::Result<usize>),
}

/// Handles a single controller connection.
async fn serve_connection(
    stream: TcpStream,
    state: Arc<Mutex<AccessoryState>>,
    shutdown: CancellationToken,
    mut responsive: watch::Receiver<bool>,
) {
    let (tx, mut commands) = mpsc::unbounded_channel();
    let id = {
        let mut state = state.lock().await;
        let id = state.next_connection;
        state.next_connection += 1;
        state.connections.insert(
            id,
            Connection {
                commands: tx,
                encrypted: false,
                subscriptions: HashSet::new(),
            },
        );
        id
    };

    let (mut reader, mut writer) = stream.into_split();
    let mut codec = HttpServerCodec::new();
    let mut session: Option<HapSecureSession> = None;
    let mut raw = Vec::new();
    let mut buf = vec![0u8; 4096];

    'connection: loop {
        let activity = tokio::select! {
            () = shutdown.cancelled() => Activity::Stop,
            command = commands.recv() => Activity::Command(command),
            read = reader.read(&mut buf) => Activity::Read(read),
        };

        let n = match activity {
            Activity::Stop => break,
            Activity::Command(command) => {
                if run_command(&mut writer, session.as_mut(), command).await {
                    continue;
                }
                break;
            }
            Activity::Read(Ok(0) | Err(_)) => break,
            Activity::Read(Ok(n)) => n,
        };

        if let Some(secure) = session.as_mut() {
            raw.extend_from_slice(&buf[..n]);
            while raw.len() > 2 {
                let total = 2 + usize::from(u16::from_le_bytes([raw[0], raw[1]])) + 16;
                if raw.len() < total {
                    break;
                }
                let block: Vec<u8> = raw.drain(..total).collect();
                match secure.decrypt_block(&block) {
                    Ok((plaintext, _)) => codec.feed(&plaintext),
                    Err(e) => {
                        tracing::error!("Mock accessory decryption failed: {}", e);
                        break 'connection;
                    }
                }
            }
        } else {
            codec.feed(&buf[..n]);
        }

        loop {
            let request = match codec.decode() {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Mock accessory got a malformed request: {}", e);
                    break 'connection;
                }
            };

            while session.is_some() && !*responsive.borrow() {
                tokio::select! {
                    () = shutdown.cancelled() => break 'connection,
                    command = commands.recv() => {
                        if !run_command(&mut writer, session.as_mut(), command).await {
                            break 'connection;
                        }
                    }
                    changed = responsive.changed() => {
                        if changed.is_err() {
                            break 'connection;
                        }
                    }
                }
            }

            let reply = handle_request(&request, id, session.is_some(), &state).await;
            if send(&mut writer, session.as_mut(), &reply.response.encode())
                .await
                .is_err()
            {
                break 'connection;
            }
            if let Some(keys) = reply.keys {
                match HapSecureSession::new(&keys.encrypt_key, &keys.decrypt_key) {
                    Ok(secure) => {
                        session = Some(secure);
                        if let Some(connection) = state.lock().await.connections.get_mut(&id) {
                            connection.encrypted = true;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Mock accessory cannot start session: {}", e);
                        break 'connection;
                    }
                }
            }
        }
    }

    state.lock().await.connections.remove(&id);
    tracing::debug!("Mock accessory connection {} closed", id);
}

/// Carry out a test command; `false` ends the connection
async fn run_command(
    writer: &mut OwnedWriteHalf,
    session: Option<&mut HapSecureSession>,
    command: Option<Command>,
) -> bool {
    match command {
        None | Some(Command::Close) => false,
        Some(Command::Push(body)) => {
            let message = HttpResponse::event(body).encode();
            send(writer, session, &message).await.is_ok()
        }
        Some(Command::Raw(message)) => send(writer, session, &message).await.is_ok(),
        Some(Command::Garbage) => {
            let mut frame = vec![4, 0, 1, 2, 3, 4];
            frame.extend_from_slice(&[0u8; 16]);
            writer.write_all(&frame).await.is_ok()
        }
    }
}

async fn send(
    writer: &mut OwnedWriteHalf,
    session: Option<&mut HapSecureSession>,
    message: &[u8],
) -> std::io::Result<()> {
    match session {
        Some(session) => {
            let frames = session
                .encrypt(message)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            writer.write_all(&frames).await
        }
        None => writer.write_all(message).await,
    }
}

async fn handle_request(
    request: &HttpRequest,
    connection: u64,
    encrypted: bool,
    state: &Mutex<AccessoryState>,
) -> Reply {
    let mut state = state.lock().await;
    state
        .requests
        .push(format!("{} {}", request.method.as_str(), request.path));

    match (request.method, request.route()) {
        (Method::Post, "/pair-setup") => {
            let reply = state.pairing.handle_pair_setup(&request.body);
            Reply::respond(tlv_response(reply.body))
        }
        (Method::Post, "/pair-verify") => {
            let reply = state.pairing.handle_pair_verify(&request.body);
            Reply {
                response: tlv_response(reply.body),
                keys: reply.session_keys,
            }
        }
        _ if !encrypted => Reply::respond(HttpResponse::new(
            StatusCode::CONNECTION_AUTHORIZATION_REQUIRED,
        )),
        (Method::Get, "/accessories") => Reply::respond(json_response(
            StatusCode::OK,
            serde_json::to_vec(&state.database).unwrap_or_default(),
        )),
        (Method::Get, "/characteristics") => Reply::respond(read_characteristics(&state, request)),
        (Method::Put, "/characteristics") => {
            Reply::respond(write_characteristics(&mut state, connection, request))
        }
        (Method::Post, "/pairings") => Reply::respond(handle_pairings(&mut state, request)),
        _ => Reply::respond(HttpResponse::new(StatusCode::NOT_FOUND)),
    }
}

fn read_characteristics(state: &AccessoryState, request: &HttpRequest) -> HttpResponse {
    let ids: Option<Vec<CharacteristicId>> = request
        .query("id")
        .map(|ids| ids.split(',').map(str::parse).collect::<Result<_, _>>().ok())
        .unwrap_or_default();
    let Some(ids) = ids else {
        return HttpResponse::new(StatusCode::BAD_REQUEST);
    };

    let values: Vec<CharacteristicValue> = ids
        .into_iter()
        .map(|id| {
            let (value, status) = match state.database.find_characteristic(id) {
                None => (None, HapStatus::ResourceDoesNotExist),
                Some(c) if !c.is_readable() => (None, HapStatus::WriteOnlyCharacteristic),
                Some(c) => (c.value.clone(), HapStatus::Success),
            };
            CharacteristicValue {
                aid: id.aid,
                iid: id.iid,
                value,
                status: Some(status.code()),
            }
        })
        .collect();
    multi_status(values, StatusCode::OK)
}

fn write_characteristics(
    state: &mut AccessoryState,
    connection: u64,
    request: &HttpRequest,
) -> HttpResponse {
    let Ok(payload) = serde_json::from_slice::<CharacteristicsPayload<CharacteristicWrite>>(&request.body)
    else {
        return HttpResponse::new(StatusCode::BAD_REQUEST);
    };

    let mut results = Vec::new();
    for write in payload.characteristics {
        let id = write.id();
        let status = match state.database.find_characteristic(id) {
            None => HapStatus::ResourceDoesNotExist,
            Some(c) if write.ev.is_some() && !c.supports_events() => {
                HapStatus::NotificationNotSupported
            }
            Some(c) if write.value.is_some() && !c.is_writable() => {
                HapStatus::ReadOnlyCharacteristic
            }
            Some(_) => {
                if let Some(enable) = write.ev {
                    if let Some(connection) = state.connections.get_mut(&connection) {
                        if enable {
                            connection.subscriptions.insert(id);
                        } else {
                            connection.subscriptions.remove(&id);
                        }
                    }
                }
                if let Some(value) = write.value {
                    state.database.set_value(id, value);
                }
                HapStatus::Success
            }
        };
        results.push(CharacteristicValue {
            aid: id.aid,
            iid: id.iid,
            value: None,
            status: Some(status.code()),
        });
    }
    multi_status(results, StatusCode::NO_CONTENT)
}

fn handle_pairings(state: &mut AccessoryState, request: &HttpRequest) -> HttpResponse {
    let reply = match TlvDecoder::decode(&request.body) {
        Ok(tlv) if tlv.get(TlvType::Method) == Some(&[methods::REMOVE_PAIRING][..]) => {
            match tlv.get(TlvType::Identifier) {
                Some(id) => {
                    let id = String::from_utf8_lossy(id).into_owned();
                    let removed = state.pairing.remove_pairing(&id);
                    tracing::debug!("Mock accessory removed pairing {} ({})", id, removed);
                    TlvEncoder::new().add_state(2).build()
                }
                None => pairing_error(),
            }
        }
        _ => pairing_error(),
    };
    tlv_response(reply)
}

fn pairing_error() -> Vec<u8> {
    TlvEncoder::new()
        .add_state(2)
        .add_byte(TlvType::Error, errors::UNKNOWN)
        .build()
}

/// `success` if every item succeeded, else 207 with per-item statuses
fn multi_status(mut values: Vec<CharacteristicValue>, success: StatusCode) -> HttpResponse {
    if values.iter().all(CharacteristicValue::is_success) {
        if success == StatusCode::NO_CONTENT {
            return HttpResponse::new(success);
        }
        for value in &mut values {
            value.status = None;
        }
        return json_response(
            success,
            serde_json::to_vec(&CharacteristicsPayload::new(values)).unwrap_or_default(),
        );
    }
    json_response(
        StatusCode::MULTI_STATUS,
        serde_json::to_vec(&CharacteristicsPayload::new(values)).unwrap_or_default(),
    )
}

fn event_body(id: CharacteristicId, value: Value) -> Vec<u8> {
    serde_json::to_vec(&CharacteristicsPayload::new(vec![CharacteristicValue {
        aid: id.aid,
        iid: id.iid,
        value: Some(value),
        status: None,
    }]))
    .unwrap_or_default()
}

fn json_response(status: StatusCode, body: Vec<u8>) -> HttpResponse {
    HttpResponse::new(status).with_body(content_type::HAP_JSON, body)
}

fn tlv_response(body: Vec<u8>) -> HttpResponse {
    HttpResponse::new(StatusCode::OK).with_body(content_type::PAIRING_TLV8, body)
}
