// 上传分片
//
// 一个分片 = 文件中的一段字节范围，由所属上传按偏移顺序逐个创建。
// 分片内部负责有限次重试：固定次数、固定间隔，不做指数退避。
// 重试时复用同一个分片对象和同一份数据

use crate::error::UploadError;
use crate::uploader::source::FileSource;
use crate::uploader::transport::{ChunkRequest, ChunkTransport, ContentRange, ProgressCallback};
use crate::uploader::types::{UploadResult, UploadStatus};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// 默认分片大小: 32MB
pub const DEFAULT_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// 图片整体发送的大小上限: 64MB，超过后按普通分片发送
pub const DEFAULT_SINGLE_CHUNK_LIMIT: u64 = 64 * 1024 * 1024;

/// 默认最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// 默认重试间隔
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// 重试回调，参数为失败的尝试序号（从 1 开始）
pub type RetryCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// 发送分片所需的上下文，由所属上传在每个分片开始前构造
#[derive(Clone)]
pub struct ChunkContext {
    /// 所属上传 ID（仅用于日志）
    pub upload_id: String,
    pub source: Arc<dyn FileSource>,
    pub transport: Arc<dyn ChunkTransport>,
    pub url: String,
    pub method: String,
    pub content_type: String,
    pub authorization: Option<String>,
    /// 上一个分片响应中的 id
    pub continuation_id: Option<String>,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub cancel_token: CancellationToken,
    pub on_progress: ProgressCallback,
    pub on_retry: Option<RetryCallback>,
}

/// 上传分片
#[derive(Debug, Clone)]
pub struct UploadChunk {
    /// 在文件中的起始偏移
    pub offset: u64,
    /// 分片字节数
    pub size: u64,
    /// 分片序号（从 1 开始）
    pub number: u64,
    pub status: UploadStatus,
    /// 已尝试次数
    pub attempts: u32,
    pub result: Option<UploadResult>,
    pub error: Option<String>,
}

impl UploadChunk {
    pub fn new(number: u64, offset: u64, size: u64) -> Self {
        Self {
            offset,
            size,
            number,
            status: UploadStatus::Pending,
            attempts: 0,
            result: None,
            error: None,
        }
    }

    /// 字节范围（左闭右开）
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.size
    }

    /// Content-Range（end 为闭区间）
    pub fn content_range(&self, total: u64) -> ContentRange {
        ContentRange {
            start: self.offset,
            end: (self.offset + self.size).saturating_sub(1),
            total,
        }
    }

    /// 发送分片（带重试）
    ///
    /// # 返回
    /// 服务器响应；取消时返回 `UploadError::Canceled`
    pub async fn send(&mut self, ctx: &ChunkContext) -> Result<UploadResult, UploadError> {
        let file_name = ctx.source.name().to_string();
        let total = ctx.source.size();

        if self.size == 0 {
            return Err(self.fail(UploadError::EmptyFile));
        }

        self.status = UploadStatus::Uploading;

        debug!(
            "[分片#{}] 开始上传 (范围: {}-{}, 大小: {} bytes, upload_id={})",
            self.number,
            self.offset,
            self.offset + self.size - 1,
            self.size,
            ctx.upload_id
        );

        // 读取分片数据，所有尝试共用
        let data = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => return Err(self.abort()),
            data = ctx.source.read_range(self.range()) => match data {
                Ok(data) => data,
                Err(e) => return Err(self.fail(e)),
            },
        };

        let request = ChunkRequest {
            url: ctx.url.clone(),
            method: ctx.method.clone(),
            content_type: ctx.content_type.clone(),
            range: self.content_range(total),
            file_name,
            upload_id: ctx.continuation_id.clone(),
            authorization: ctx.authorization.clone(),
            body: Arc::new(data),
        };

        let max_attempts = ctx.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if ctx.cancel_token.is_cancelled() {
                return Err(self.abort());
            }

            self.attempts = attempt;

            // 取消时直接丢弃进行中的请求
            let response = tokio::select! {
                biased;
                _ = ctx.cancel_token.cancelled() => return Err(self.abort()),
                response = ctx.transport.send(&request, Arc::clone(&ctx.on_progress)) => response,
            };

            let error = match response
                .map_err(UploadError::from)
                .and_then(|r| UploadResult::parse(&r.body))
            {
                Ok(result) => {
                    (ctx.on_progress)(self.size);

                    self.status = UploadStatus::Completed;
                    self.result = Some(result.clone());

                    debug!(
                        "[分片#{}] ✓ 上传成功 (尝试 {} 次, id={})",
                        self.number, attempt, result.id
                    );

                    return Ok(result);
                }
                Err(e) if !e.is_retriable() => {
                    error!("[分片#{}] 上传失败（不可重试）: {}", self.number, e);
                    return Err(self.fail(e));
                }
                Err(e) => e,
            };

            last_error = error.to_string();

            if let Some(on_retry) = &ctx.on_retry {
                on_retry(attempt);
            }

            if attempt < max_attempts {
                warn!(
                    "[分片#{}] 上传失败，等待 {}ms 后重试 ({}/{}): {}",
                    self.number,
                    ctx.retry_delay.as_millis(),
                    attempt,
                    max_attempts,
                    error
                );

                tokio::select! {
                    biased;
                    _ = ctx.cancel_token.cancelled() => return Err(self.abort()),
                    _ = tokio::time::sleep(ctx.retry_delay) => {}
                }
            }
        }

        error!(
            "[分片#{}] 上传失败，已达最大尝试次数 ({})",
            self.number, max_attempts
        );

        Err(self.fail(UploadError::RetryExhausted {
            attempts: self.attempts,
            last_error,
        }))
    }

    fn fail(&mut self, error: UploadError) -> UploadError {
        self.status = UploadStatus::Error;
        self.error = Some(error.to_string());
        error
    }

    fn abort(&mut self) -> UploadError {
        debug!("[分片#{}] 已中止", self.number);
        self.status = UploadStatus::Canceled;
        UploadError::Canceled
    }
}
