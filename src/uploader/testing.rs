// 测试辅助：脚本化的传输层和本地回环 HTTP 服务器

use crate::uploader::transport::{
    ChunkRequest, ChunkTransport, ImportRequest, ProgressCallback, TransportError,
    TransportResponse,
};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// 预设的一次响应
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 200 + 指定响应体
    Ok(String),
    /// 指定状态码
    Status(u16, String),
    /// 网络错误
    Network(String),
    /// 永不返回，用于测试取消
    Hang,
}

/// 按脚本依次返回响应的传输层，脚本耗尽后返回 `{"id":"up-N"}`
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<ChunkRequest>>,
    imports: Mutex<Vec<ImportRequest>>,
    calls: AtomicUsize,
    hang_started: Notify,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(replies: Vec<MockReply>) -> Arc<Self> {
        let transport = Self::default();
        *transport.script.lock() = replies.into();
        Arc::new(transport)
    }

    pub fn requests(&self) -> Vec<ChunkRequest> {
        self.requests.lock().clone()
    }

    pub fn imports(&self) -> Vec<ImportRequest> {
        self.imports.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 等待某个请求进入 Hang
    pub async fn wait_for_hang(&self) {
        self.hang_started.notified().await;
    }

    async fn reply(&self) -> Result<TransportResponse, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let next = self.script.lock().pop_front();

        match next {
            Some(MockReply::Ok(body)) => Ok(TransportResponse { status: 200, body }),
            Some(MockReply::Status(status, body)) => Err(TransportError::Status { status, body }),
            Some(MockReply::Network(message)) => Err(TransportError::Network(message)),
            Some(MockReply::Hang) => {
                self.hang_started.notify_one();
                futures::future::pending::<()>().await;
                unreachable!()
            }
            None => Ok(TransportResponse {
                status: 200,
                body: format!(r#"{{"id":"up-{}"}}"#, n),
            }),
        }
    }
}

#[async_trait]
impl ChunkTransport for MockTransport {
    async fn send(
        &self,
        request: &ChunkRequest,
        on_progress: ProgressCallback,
    ) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push(request.clone());

        let len = request.body.len() as u64;
        on_progress(len / 2);

        let result = self.reply().await;
        if result.is_ok() {
            on_progress(len);
        }
        result
    }

    async fn import(&self, request: &ImportRequest) -> Result<TransportResponse, TransportError> {
        self.imports.lock().push(request.clone());
        self.reply().await
    }
}

/// 回环服务器记录的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Clone)]
struct ServerState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responses: Arc<Mutex<VecDeque<(u16, String)>>>,
}

pub struct TestServer {
    addr: SocketAddr,
    state: ServerState,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }
}

/// 记录请求并按顺序返回预设响应，脚本耗尽后返回 `{"id":"default"}`
async fn record(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state.requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers,
        body: body.to_vec(),
    });

    let (status, body) = state
        .responses
        .lock()
        .pop_front()
        .unwrap_or((200, r#"{"id":"default"}"#.to_string()));

    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
}

/// 启动回环 HTTP 服务器，任意路径的请求都交给 `record`
pub async fn spawn_http_server(responses: Vec<(u16, String)>) -> TestServer {
    let state = ServerState {
        requests: Arc::new(Mutex::new(Vec::new())),
        responses: Arc::new(Mutex::new(VecDeque::from(responses))),
    };

    let app = Router::new().fallback(record).with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestServer { addr, state }
}
