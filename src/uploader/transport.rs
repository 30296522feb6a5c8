// 分片传输层
//
// 一次分片尝试 = 一个 HTTP 请求。上层只依赖 ChunkTransport trait，
// 取消通过丢弃 send() 返回的 future 实现（reqwest 会中止连接）

use crate::error::UploadError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{Body, Client, Method};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// 请求体按此大小切片推送，每推送一片触发一次进度回调
const STREAM_PIECE_SIZE: usize = 64 * 1024;

/// 认证方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Authorization {
    /// `Bearer {token}`
    Bearer { token: String },
    /// 预先拼好的完整头部值
    Raw(String),
}

impl Authorization {
    pub fn bearer(token: impl Into<String>) -> Self {
        Authorization::Bearer {
            token: token.into(),
        }
    }

    /// Authorization 头部值
    pub fn header_value(&self) -> String {
        match self {
            Authorization::Bearer { token } => format!("Bearer {}", token),
            Authorization::Raw(value) => value.clone(),
        }
    }
}

/// 字节范围（end 为闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// 单个分片请求
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub url: String,
    pub method: String,
    pub content_type: String,
    pub range: ContentRange,
    pub file_name: String,
    /// 上一个分片响应中的 id，首个分片为 None
    pub upload_id: Option<String>,
    pub authorization: Option<String>,
    pub body: Arc<Vec<u8>>,
}

/// 远程导入请求：`url={link}` 表单
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub endpoint: String,
    pub link: String,
    pub authorization: Option<String>,
}

/// 进度回调，参数为本次请求已发送的字节数（累计值）
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// 2xx 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// 单次请求失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// 服务器返回非 2xx
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 连接、超时等网络错误
    #[error("网络错误: {0}")]
    Network(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Network(_) => None,
        }
    }
}

/// 单次尝试的错误分类：413 不可重试，其余均为暂时性错误
impl From<TransportError> for UploadError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Status { status: 413, .. } => UploadError::EntityTooLarge,
            TransportError::Status { status, body } => {
                UploadError::Transport(format!("HTTP {}: {}", status, body))
            }
            TransportError::Network(message) => UploadError::Transport(message),
        }
    }
}

/// 分片传输接口
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// 发送一个分片
    async fn send(
        &self,
        request: &ChunkRequest,
        on_progress: ProgressCallback,
    ) -> Result<TransportResponse, TransportError>;

    /// 请求服务器导入远程链接
    async fn import(&self, request: &ImportRequest) -> Result<TransportResponse, TransportError>;
}

/// 基于 reqwest 的 HTTP 传输
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// 创建传输层
    ///
    /// 只设置连接超时：大分片的整体耗时无法预估，不设置总超时
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("创建 HTTP 客户端失败")?;

        Ok(Self { client })
    }

    /// 使用已有的客户端
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn finish(response: reqwest::Response) -> Result<TransportResponse, TransportError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("读取响应失败: {}", e)))?;

        debug!("响应: status={}, body={}", status, body);

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::Network(format!("非法请求头 {:?}: {}", value, e)))
}

/// 把请求体切成小片推送，推送时回报进度
fn progress_body(data: Arc<Vec<u8>>, on_progress: ProgressCallback) -> Body {
    let total = data.len();
    let pieces = (0..total).step_by(STREAM_PIECE_SIZE).map(move |start| {
        let end = (start + STREAM_PIECE_SIZE).min(total);
        let piece = data[start..end].to_vec();
        on_progress(end as u64);
        Ok::<Vec<u8>, std::io::Error>(piece)
    });

    Body::wrap_stream(futures::stream::iter(pieces))
}

#[async_trait]
impl ChunkTransport for HttpTransport {
    async fn send(
        &self,
        request: &ChunkRequest,
        on_progress: ProgressCallback,
    ) -> Result<TransportResponse, TransportError> {
        let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|e| TransportError::Network(format!("非法请求方法 {}: {}", request.method, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, header_value(&request.content_type)?);
        headers.insert(CONTENT_RANGE, header_value(&request.range.to_string())?);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(request.body.len() as u64));
        headers.insert(
            "x-file-name",
            header_value(&urlencoding::encode(&request.file_name))?,
        );
        if let Some(upload_id) = &request.upload_id {
            headers.insert("x-upload-id", header_value(upload_id)?);
        }
        if let Some(auth) = &request.authorization {
            headers.insert(AUTHORIZATION, header_value(auth)?);
        }

        debug!(
            "发送分片: {} {}, {}, X-Upload-Id={:?}",
            method, request.url, request.range, request.upload_id
        );

        let response = self
            .client
            .request(method, &request.url)
            .headers(headers)
            .body(progress_body(Arc::clone(&request.body), on_progress))
            .send()
            .await
            .map_err(|e| {
                warn!("分片请求失败: {}", e);
                TransportError::Network(e.to_string())
            })?;

        Self::finish(response).await
    }

    async fn import(&self, request: &ImportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .post(&request.endpoint)
            .header(ACCEPT, "application/json")
            .form(&[("url", request.link.as_str())]);

        if let Some(auth) = &request.authorization {
            builder = builder.header(AUTHORIZATION, header_value(auth)?);
        }

        debug!("请求远程导入: {} <- {}", request.endpoint, request.link);

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Self::finish(response).await
    }
}
