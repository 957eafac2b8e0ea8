//! HTTP live view
//!
//! Two routes, served with axum:
//!
//! - `GET /` returns a minimal page embedding the stream
//! - `GET /stream` returns `multipart/x-mixed-replace`, one JPEG per part
//!
//! Each viewer's response body is a stream driven by its own state machine
//! over the frame cache:
//!
//! ```text
//!  AWAIT_FRAME ──► SEND_HEADER ──► SEND_BODY ──► SEND_BOUNDARY
//!       ▲                                              │
//!       └──────────────────────────────────────────────┘
//! ```
//!
//! The body stream owns the viewer's slot. When the connection goes away the
//! server drops the body, which frees the slot even if no frame is flowing.
//! Viewers never wait on each other, so two of them may be showing
//! different frames at the same moment.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::Stream;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::cache::{Frame, FrameCache, FrameWatch};
use crate::protocol::constants::STREAM_BOUNDARY;
use crate::stats::RelayMetrics;

const INDEX_HTML: &str = "<!DOCTYPE html>\n\
<html>\n\
<head><title>Live feed</title></head>\n\
<body style=\"margin:0;background:#000\">\n\
<img src=\"/stream\" style=\"width:100%\">\n\
</body>\n\
</html>\n";

/// Settings shared by every viewer
#[derive(Debug, Clone)]
pub struct LiveViewOptions {
    /// Maximum concurrent viewers (0 = unlimited)
    pub max_viewers: usize,
    /// Longest wait between cache checks
    pub pacing_interval: Duration,
    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,
}

/// State handed to every request handler
struct LiveState {
    cache: Arc<FrameCache>,
    metrics: Arc<RelayMetrics>,
    pacing_interval: Duration,
    viewer_semaphore: Option<Arc<Semaphore>>,
}

/// HTTP live view server
pub struct LiveView {
    state: Arc<LiveState>,
    tcp_nodelay: bool,
}

impl LiveView {
    pub fn new(cache: Arc<FrameCache>, metrics: Arc<RelayMetrics>, options: LiveViewOptions) -> Self {
        let viewer_semaphore = if options.max_viewers > 0 {
            Some(Arc::new(Semaphore::new(options.max_viewers)))
        } else {
            None
        };

        Self {
            state: Arc::new(LiveState {
                cache,
                metrics,
                pacing_interval: options.pacing_interval,
                viewer_semaphore,
            }),
            tcp_nodelay: options.tcp_nodelay,
        }
    }

    /// Routes of the live view
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/stream", get(stream))
            .with_state(Arc::clone(&self.state))
    }

    /// Serve viewers from `listener` until the task is aborted
    pub async fn run(self, listener: TcpListener) {
        tracing::info!(addr = ?listener.local_addr().ok(), "Live view listening");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        if let Err(e) = axum::serve(listener, app)
            .tcp_nodelay(self.tcp_nodelay)
            .await
        {
            tracing::error!(error = %e, "Live view server error");
        }
    }
}

/// GET /
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /stream
async fn stream(
    State(state): State<Arc<LiveState>>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
) -> Response {
    let permit = match &state.viewer_semaphore {
        Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer_addr, "Viewer rejected: limit reached");
                return (StatusCode::SERVICE_UNAVAILABLE, "too many viewers\n").into_response();
            }
        },
        None => None,
    };

    let viewer = ViewerSlot::open(peer_addr, Arc::clone(&state.metrics), permit);
    let parts = PartStream {
        watch: state.cache.subscribe(),
        state: StreamState::Preamble,
        pacing: state.pacing_interval,
        metrics: Arc::clone(&state.metrics),
        _viewer: viewer,
    };

    (
        [
            (header::CONTENT_TYPE, stream_content_type()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (header::PRAGMA, "no-cache".to_string()),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
        ],
        Body::from_stream(parts.into_stream()),
    )
        .into_response()
}

/// A viewer's claim on the live view, released on drop
struct ViewerSlot {
    peer_addr: SocketAddr,
    metrics: Arc<RelayMetrics>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl ViewerSlot {
    fn open(
        peer_addr: SocketAddr,
        metrics: Arc<RelayMetrics>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        metrics.viewer_connected();
        tracing::info!(peer = %peer_addr, "Viewer connected");

        Self {
            peer_addr,
            metrics,
            _permit: permit,
        }
    }
}

impl Drop for ViewerSlot {
    fn drop(&mut self) {
        self.metrics.viewer_disconnected();
        tracing::info!(peer = %self.peer_addr, "Viewer disconnected");
    }
}

/// Per-viewer streaming state
enum StreamState {
    Preamble,
    AwaitFrame,
    SendHeader(Frame),
    SendBody(Frame),
    SendBoundary,
}

/// Multipart body of one viewer
struct PartStream {
    watch: FrameWatch,
    state: StreamState,
    pacing: Duration,
    metrics: Arc<RelayMetrics>,
    _viewer: ViewerSlot,
}

impl PartStream {
    fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        futures_util::stream::unfold(self, |mut parts| async move {
            let chunk = parts.next_chunk().await;
            Some((Ok::<_, Infallible>(chunk), parts))
        })
    }

    /// Advance the state machine until it has bytes to emit
    async fn next_chunk(&mut self) -> Bytes {
        loop {
            let (next, out) = match std::mem::replace(&mut self.state, StreamState::AwaitFrame) {
                StreamState::Preamble => (StreamState::AwaitFrame, Some(opening_boundary())),
                StreamState::AwaitFrame => match self.watch.next_frame(self.pacing).await {
                    Some(frame) => (StreamState::SendHeader(frame), None),
                    None => (StreamState::AwaitFrame, None),
                },
                StreamState::SendHeader(frame) => {
                    let header = part_header(frame.len());
                    (StreamState::SendBody(frame), Some(header))
                }
                StreamState::SendBody(frame) => (StreamState::SendBoundary, Some(frame.into_bytes())),
                StreamState::SendBoundary => {
                    self.metrics.part_sent();
                    (StreamState::AwaitFrame, Some(part_boundary()))
                }
            };

            self.state = next;
            if let Some(bytes) = out {
                return bytes;
            }
        }
    }
}

fn stream_content_type() -> String {
    format!("multipart/x-mixed-replace;boundary={}", STREAM_BOUNDARY)
}

/// First bytes of the body, before any part
fn opening_boundary() -> Bytes {
    Bytes::from(format!("--{}\r\n", STREAM_BOUNDARY))
}

/// Header of one multipart part
fn part_header(len: usize) -> Bytes {
    Bytes::from(format!(
        "Content-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        len
    ))
}

/// Delimiter written after each part body
fn part_boundary() -> Bytes {
    Bytes::from(format!("\r\n--{}\r\n", STREAM_BOUNDARY))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;

    fn options() -> LiveViewOptions {
        LiveViewOptions {
            max_viewers: 4,
            pacing_interval: Duration::from_millis(30),
            tcp_nodelay: true,
        }
    }

    async fn start(cache: Arc<FrameCache>, options: LiveViewOptions) -> (SocketAddr, Arc<RelayMetrics>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let metrics = Arc::new(RelayMetrics::new());
        tokio::spawn(LiveView::new(cache, Arc::clone(&metrics), options).run(listener));
        (addr, metrics)
    }

    // HTTP/1.0 keeps the body unchunked and closes after the response
    async fn request(addr: SocketAddr, method: &str, path: &str) -> TcpStream {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let raw = format!("{} {} HTTP/1.0\r\nHost: relay\r\n\r\n", method, path);
        stream.write_all(raw.as_bytes()).await.unwrap();
        stream
    }

    /// Read until `pattern` has been seen, returning everything read so far
    async fn read_until(stream: &mut TcpStream, buf: &mut Vec<u8>, pattern: &[u8]) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !buf.windows(pattern.len()).any(|w| w == pattern) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut chunk = [0u8; 1024];
            let n = tokio::time::timeout(remaining, stream.read(&mut chunk))
                .await
                .expect("timed out waiting for response")
                .unwrap();
            assert!(n > 0, "connection closed early");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn read_to_end(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn status_line(response: &str) -> &str {
        response.lines().next().unwrap_or("")
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_part_framing() {
        assert_eq!(
            &part_header(4)[..],
            b"Content-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n"
        );
        assert_eq!(
            &part_boundary()[..],
            format!("\r\n--{}\r\n", STREAM_BOUNDARY).as_bytes()
        );
        assert_eq!(
            stream_content_type(),
            format!("multipart/x-mixed-replace;boundary={}", STREAM_BOUNDARY)
        );
    }

    #[tokio::test]
    async fn test_index_page() {
        let (addr, _) = start(Arc::new(FrameCache::new()), options()).await;

        let mut stream = request(addr, "GET", "/").await;
        let response = read_to_end(&mut stream).await;

        assert!(status_line(&response).ends_with("200 OK"));
        assert!(response.to_ascii_lowercase().contains("content-type: text/html"));
        assert!(response.contains("src=\"/stream\""));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let (addr, _) = start(Arc::new(FrameCache::new()), options()).await;

        let mut stream = request(addr, "GET", "/missing").await;
        assert!(status_line(&read_to_end(&mut stream).await).ends_with("404 Not Found"));
    }

    #[tokio::test]
    async fn test_wrong_method() {
        let (addr, _) = start(Arc::new(FrameCache::new()), options()).await;

        let mut stream = request(addr, "POST", "/stream").await;
        assert!(status_line(&read_to_end(&mut stream).await).ends_with("405 Method Not Allowed"));
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let (addr, _) = start(Arc::new(FrameCache::new()), options()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"NONSENSE\r\n\r\n").await.unwrap();
        assert!(status_line(&read_to_end(&mut stream).await).ends_with("400 Bad Request"));
    }

    #[tokio::test]
    async fn test_viewer_receives_frame_published_after_connect() {
        let cache = Arc::new(FrameCache::new());
        let (addr, metrics) = start(Arc::clone(&cache), options()).await;

        let mut stream = request(addr, "GET", "/stream").await;
        let mut buf = Vec::new();
        let opening = format!("--{}\r\n", STREAM_BOUNDARY);
        read_until(&mut stream, &mut buf, opening.as_bytes()).await;

        let head = String::from_utf8_lossy(&buf).to_ascii_lowercase();
        assert!(status_line(&head).ends_with("200 ok"));
        assert!(head.contains("multipart/x-mixed-replace"));

        cache.publish(Frame::from(vec![0xDE, 0xAD, 0xBE, 0xEF])).await;

        let header = b"Content-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n";
        let closing = part_boundary();
        let mut expected = header.to_vec();
        expected.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        expected.extend_from_slice(&closing);

        buf.clear();
        read_until(&mut stream, &mut buf, &expected).await;

        assert_eq!(metrics.snapshot().viewers_active, 1);
    }

    #[tokio::test]
    async fn test_viewers_are_independent() {
        let cache = Arc::new(FrameCache::new());
        cache.publish(Frame::from(b"first".to_vec())).await;
        let (addr, metrics) = start(Arc::clone(&cache), options()).await;

        let mut a = request(addr, "GET", "/stream").await;
        let mut buf_a = Vec::new();
        read_until(&mut a, &mut buf_a, b"first").await;

        // A second viewer dropping does not disturb the first
        let mut b = request(addr, "GET", "/stream").await;
        let mut buf_b = Vec::new();
        read_until(&mut b, &mut buf_b, b"first").await;
        drop(b);

        cache.publish(Frame::from(b"second".to_vec())).await;
        read_until(&mut a, &mut buf_a, b"second").await;

        let stats = metrics.snapshot();
        assert_eq!(stats.viewers_total, 2);
        assert!(stats.parts_sent >= 1);
    }

    #[tokio::test]
    async fn test_viewer_limit() {
        let cache = Arc::new(FrameCache::new());
        let opts = LiveViewOptions {
            max_viewers: 1,
            ..options()
        };
        let (addr, metrics) = start(cache, opts).await;

        let mut first = request(addr, "GET", "/stream").await;
        let mut buf = Vec::new();
        read_until(&mut first, &mut buf, STREAM_BOUNDARY.as_bytes()).await;
        wait_until(|| metrics.snapshot().viewers_active == 1).await;

        let mut second = request(addr, "GET", "/stream").await;
        assert!(status_line(&read_to_end(&mut second).await).ends_with("503 Service Unavailable"));
    }

    #[tokio::test]
    async fn test_departed_viewer_frees_slot_while_feed_stalled() {
        let cache = Arc::new(FrameCache::new());
        cache.publish(Frame::from(vec![0xDE, 0xAD, 0xBE, 0xEF])).await;
        let opts = LiveViewOptions {
            max_viewers: 1,
            ..options()
        };
        let (addr, metrics) = start(Arc::clone(&cache), opts).await;

        let mut first = request(addr, "GET", "/stream").await;
        let mut buf = Vec::new();
        read_until(&mut first, &mut buf, &[0xDE, 0xAD, 0xBE, 0xEF]).await;
        drop(first);

        // No further publishes: the slot must come back anyway
        wait_until(|| metrics.snapshot().viewers_active == 0).await;
        assert_eq!(cache.generation(), 1);

        let mut second = request(addr, "GET", "/stream").await;
        let mut buf = Vec::new();
        read_until(&mut second, &mut buf, &[0xDE, 0xAD, 0xBE, 0xEF]).await;
        let head = String::from_utf8_lossy(&buf).to_string();
        assert!(status_line(&head).ends_with("200 OK"));
    }
}
