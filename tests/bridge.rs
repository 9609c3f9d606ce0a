//! End-to-end bridge tests against a scripted camera.
//!
//! The mock camera serves two RTSP feeds and an ONVIF endpoint; each can be
//! taken down and brought back independently to drive outage scenarios.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use cambridge::control::{SoapResponse, SoapTransport};
use cambridge::stream::{FrameReader, FrameSource};
use cambridge::{
    BridgeConfig, CameraBridge, CameraEndpoint, CommandOutcome, ConnectionState, Direction, Error,
    ErrorKind, PtzRequest, Result, StreamId,
};

const PRIMARY_URL: &str = "rtsp://cam.test:554/stream6";
const SECONDARY_URL: &str = "rtsp://cam.test:554/stream2";

/// Shared switchboard: which feeds are currently serving frames.
#[derive(Clone, Default)]
struct Feeds {
    down: Arc<Mutex<HashMap<String, bool>>>,
}

impl Feeds {
    fn set_down(&self, url: &str, down: bool) {
        self.down.lock().unwrap().insert(url.to_string(), down);
    }

    fn is_down(&self, url: &str) -> bool {
        *self.down.lock().unwrap().get(url).unwrap_or(&false)
    }
}

#[derive(Clone)]
struct MockSource {
    feeds: Feeds,
}

struct MockReader {
    url: String,
    n: u64,
    feeds: Feeds,
}

#[async_trait]
impl FrameSource for MockSource {
    type Reader = MockReader;

    async fn open(&self, url: &str) -> Result<MockReader> {
        if self.feeds.is_down(url) {
            return Err(Error::Network("connection refused".into()));
        }
        Ok(MockReader {
            url: url.to_string(),
            n: 0,
            feeds: self.feeds.clone(),
        })
    }
}

#[async_trait]
impl FrameReader for MockReader {
    async fn read_frame(&mut self) -> Result<Bytes> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        if self.feeds.is_down(&self.url) {
            return Err(Error::Network("stream reset".into()));
        }
        self.n += 1;
        Ok(Bytes::from(format!("{}#{}", self.url, self.n)))
    }

    async fn close(&mut self) {}
}

const PROFILES_BODY: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body>
    <trt:GetProfilesResponse xmlns:trt="http://www.onvif.org/ver10/media/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema">
      <trt:Profiles token="profile_6"><tt:PTZConfiguration token="ptz0"/></trt:Profiles>
    </trt:GetProfilesResponse></s:Body></s:Envelope>"#;

const EMPTY_OK: &str =
    r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body/></s:Envelope>"#;

/// ONVIF side of the mock camera: records PTZ operations in order.
#[derive(Clone, Default)]
struct MockCamera {
    log: Arc<Mutex<Vec<String>>>,
    reject_auth: Arc<Mutex<bool>>,
}

impl MockCamera {
    fn ptz_ops(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|op| *op == "ContinuousMove" || *op == "Stop")
            .cloned()
            .collect()
    }
}

fn operation_of(envelope: &str) -> String {
    for op in ["GetServices", "GetProfiles", "ContinuousMove", "Stop"] {
        if envelope.contains(&format!("<{op} ")) || envelope.contains(&format!("<{op}>")) {
            return op.to_string();
        }
    }
    "Unknown".to_string()
}

#[async_trait]
impl SoapTransport for MockCamera {
    async fn post(&self, _endpoint: &str, envelope: String) -> Result<SoapResponse> {
        if *self.reject_auth.lock().unwrap() {
            return Ok(SoapResponse {
                status: 401,
                body: String::new(),
            });
        }
        let op = operation_of(&envelope);
        self.log.lock().unwrap().push(op.clone());
        let body = if op == "GetProfiles" { PROFILES_BODY } else { EMPTY_OK };
        Ok(SoapResponse {
            status: 200,
            body: body.to_string(),
        })
    }
}

fn config() -> BridgeConfig {
    BridgeConfig::new(CameraEndpoint {
        primary_rtsp_url: PRIMARY_URL.into(),
        secondary_rtsp_url: SECONDARY_URL.into(),
        onvif_host: "cam.test".into(),
        onvif_port: 2020,
        username: "admin".into(),
        password: "pw".into(),
    })
    .backoff(Duration::from_millis(1), Duration::from_millis(10))
    .connect_timeout(Duration::from_millis(500))
    .max_read_failures(2)
    .publisher_poll_interval(Duration::from_millis(5))
}

fn start(feeds: Feeds, camera: MockCamera) -> CameraBridge {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
    CameraBridge::start(config(), MockSource { feeds }, camera)
}

async fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_both_streams_deliver_independent_increasing_sequences() {
    let bridge = start(Feeds::default(), MockCamera::default());

    let mut primary = bridge.publisher(StreamId::Primary);
    let mut secondary = bridge.publisher(StreamId::Secondary);

    let mut primary_seqs = Vec::new();
    let mut secondary_seqs = Vec::new();
    for _ in 0..3 {
        let p = primary.next().await.unwrap();
        assert!(p.data.starts_with(PRIMARY_URL.as_bytes()));
        primary_seqs.push(p.seq);

        let s = secondary.next().await.unwrap();
        assert!(s.data.starts_with(SECONDARY_URL.as_bytes()));
        secondary_seqs.push(s.seq);
    }

    // Each feed's sequence is strictly increasing on its own.
    assert!(primary_seqs.windows(2).all(|w| w[0] < w[1]));
    assert!(secondary_seqs.windows(2).all(|w| w[0] < w[1]));

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_move_then_stop_reach_camera_in_order() {
    let camera = MockCamera::default();
    let bridge = start(Feeds::default(), camera.clone());

    let outcome = bridge
        .request_ptz(PtzRequest::Move {
            direction: Direction::Left,
            speed: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome, CommandOutcome::Delivered);

    let outcome = bridge.request_ptz(PtzRequest::Stop).await.unwrap();
    assert_eq!(outcome, CommandOutcome::Delivered);

    // Exactly one move and one stop, in submission order.
    assert_eq!(camera.ptz_ops(), vec!["ContinuousMove", "Stop"]);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_primary_outage_leaves_other_channels_live() {
    let feeds = Feeds::default();
    let bridge = start(feeds.clone(), MockCamera::default());

    wait_for("all channels up", || {
        let s = bridge.status();
        s.primary_stream == ConnectionState::Connected
            && s.secondary_stream == ConnectionState::Connected
            && s.onvif == ConnectionState::Connected
    })
    .await;

    feeds.set_down(PRIMARY_URL, true);
    wait_for("primary outage visible", || {
        bridge.status().primary_stream == ConnectionState::Error(ErrorKind::Network)
    })
    .await;

    // Mid-outage: the other channels are unaffected.
    let snap = bridge.status();
    assert_eq!(snap.secondary_stream, ConnectionState::Connected);
    assert_eq!(snap.onvif, ConnectionState::Connected);

    // Secondary viewers keep receiving frames throughout.
    let mut secondary = bridge.publisher(StreamId::Secondary);
    assert!(secondary.next().await.is_some());

    feeds.set_down(PRIMARY_URL, false);
    wait_for("primary recovered", || {
        bridge.status().primary_stream == ConnectionState::Connected
    })
    .await;

    // Frames flow again on a recovered primary.
    let mut primary = bridge.publisher(StreamId::Primary);
    assert!(primary.next().await.is_some());

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_auth_failure_holds_until_explicit_reconnect() {
    let camera = MockCamera::default();
    *camera.reject_auth.lock().unwrap() = true;
    let bridge = start(Feeds::default(), camera.clone());

    wait_for("auth failure visible", || {
        bridge.status().onvif == ConnectionState::Error(ErrorKind::Auth)
    })
    .await;

    // No automatic retry: the state holds and commands fail fast.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(bridge.status().onvif, ConnectionState::Error(ErrorKind::Auth));
    let err = bridge.request_ptz(PtzRequest::Stop).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);

    // Fixed credentials take effect only after an explicit reconnect.
    *camera.reject_auth.lock().unwrap() = false;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(bridge.status().onvif, ConnectionState::Error(ErrorKind::Auth));

    bridge.reconnect_control().await.unwrap();
    bridge.request_ptz(PtzRequest::Stop).await.unwrap();
    assert_eq!(bridge.status().onvif, ConnectionState::Connected);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_ends_open_publishers() {
    let bridge = start(Feeds::default(), MockCamera::default());

    let mut primary = bridge.publisher(StreamId::Primary);
    assert!(primary.next().await.is_some());

    bridge.shutdown().await;

    // Drain whatever was in flight, then the sequence ends.
    let mut remaining = 0;
    while primary.next().await.is_some() {
        remaining += 1;
        assert!(remaining < 10, "publisher must terminate after shutdown");
    }
}
