// 本地文件上传
//
// 状态流转: Pending → Uploading → Completed / Canceled / Error
//
// 分片严格按偏移顺序逐个发送，前一个分片响应中的 id
// 通过 X-Upload-Id 传给下一个分片。每次 await 返回后都会重新检查
// 是否已被取消，取消后不再推进任何状态

use crate::error::{RejectionReason, UploadError};
use crate::events::{EventBus, UploadEvent};
use crate::uploader::chunk::{
    ChunkContext, UploadChunk, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
    DEFAULT_SINGLE_CHUNK_LIMIT,
};
use crate::uploader::mime::{format_from_name, MimeRegistry};
use crate::uploader::progress::{format_bytes, Progress};
use crate::uploader::source::FileSource;
use crate::uploader::transport::{Authorization, ChunkTransport, ProgressCallback};
use crate::uploader::types::{OutcomeCell, UploadResult, UploadStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// 上传参数
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// 分片上传地址
    pub url: String,
    /// HTTP 方法（POST / PUT）
    pub method: String,
    pub authorization: Option<Authorization>,
    pub chunk_size: u64,
    /// 图片作为单个分片发送
    pub single_chunk_images: bool,
    /// 整体发送的图片大小上限（字节），更大的图片照常分片
    pub single_chunk_limit: u64,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "POST".to_string(),
            authorization: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            single_chunk_images: true,
            single_chunk_limit: DEFAULT_SINGLE_CHUNK_LIMIT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// 上传状态快照
#[derive(Debug, Clone, Serialize)]
pub struct UploadState {
    pub name: String,
    pub size: u64,
    pub mime_type: Option<String>,
    /// 小写扩展名
    pub format: String,
    pub status: UploadStatus,
    pub chunk_size: u64,
    /// 已确认上传的字节数
    pub offset: u64,
    /// 下一个要发送的分片序号（从 1 开始）
    pub chunk_number: u64,
    pub chunk_count: u64,
    /// 当前分片已失败的次数
    pub retry_count: u32,
    pub rejection: Option<RejectionReason>,
    /// 续传 ID（下一个分片的 X-Upload-Id）
    pub continuation_id: Option<String>,
    pub result: Option<UploadResult>,
    pub progress: Progress,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 开始时间 (Unix timestamp)
    pub started_at: Option<i64>,
    /// 完成时间 (Unix timestamp)
    pub completed_at: Option<i64>,
    pub error: Option<String>,
}

/// 本地文件上传
pub struct LocalFileUpload {
    id: String,
    source: Arc<dyn FileSource>,
    format: String,
    options: UploadOptions,
    transport: Arc<dyn ChunkTransport>,
    mimes: Arc<MimeRegistry>,
    state: Arc<Mutex<UploadState>>,
    events: Arc<EventBus<UploadEvent>>,
    cancel_token: CancellationToken,
    outcome: OutcomeCell,
}

impl fmt::Debug for LocalFileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LocalFileUpload")
            .field("id", &self.id)
            .field("name", &state.name)
            .field("size", &state.size)
            .field("status", &state.status)
            .field("offset", &state.offset)
            .finish()
    }
}

impl LocalFileUpload {
    /// 创建上传（不会发起任何请求）
    pub fn new(
        source: Arc<dyn FileSource>,
        options: UploadOptions,
        transport: Arc<dyn ChunkTransport>,
        mimes: Arc<MimeRegistry>,
    ) -> Self {
        let name = source.name().to_string();
        let size = source.size();
        let format = format_from_name(&name);

        let state = UploadState {
            format: format.clone(),
            mime_type: source.mime_type().map(|s| s.to_string()),
            name,
            size,
            status: UploadStatus::Pending,
            chunk_size: options.chunk_size,
            offset: 0,
            chunk_number: 1,
            chunk_count: 0,
            retry_count: 0,
            rejection: None,
            continuation_id: None,
            result: None,
            progress: Progress::new(0, size),
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
            error: None,
        };

        Self {
            id: Uuid::new_v4().to_string(),
            source,
            format,
            options,
            transport,
            mimes,
            state: Arc::new(Mutex::new(state)),
            events: Arc::new(EventBus::new()),
            cancel_token: CancellationToken::new(),
            outcome: OutcomeCell::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &Arc<dyn FileSource> {
        &self.source
    }

    /// 小写扩展名
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn events(&self) -> &EventBus<UploadEvent> {
        &self.events
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> UploadState {
        self.state.lock().clone()
    }

    pub fn status(&self) -> UploadStatus {
        self.state.lock().status
    }

    pub fn progress(&self) -> Progress {
        self.state.lock().progress
    }

    pub fn rejection(&self) -> Option<RejectionReason> {
        self.state.lock().rejection
    }

    /// 标记为被准入控制拒绝，之后 start() 会直接失败
    pub fn reject(&self, reason: RejectionReason) {
        let mut state = self.state.lock();
        state.rejection = Some(reason);
        state.error = Some(reason.to_string());
    }

    /// 格式化后的文件大小，如 "1.5 MB"
    pub fn formatted_size(&self) -> String {
        format_bytes(self.state.lock().size)
    }

    /// 开始上传，直到完成、失败或被取消
    ///
    /// # 返回
    /// 最后一个分片的服务器响应
    pub async fn start(&self) -> Result<UploadResult, UploadError> {
        let (name, size, chunk_count, content_type) = {
            let mut state = self.state.lock();

            if let Some(reason) = state.rejection {
                return Err(UploadError::Rejected(reason));
            }
            if state.status.is_started() {
                return Err(UploadError::AlreadyStarted);
            }

            let content_type = self
                .mimes
                .content_type_for(state.mime_type.as_deref(), &state.name);

            // 🔥 小图片整体作为一个分片发送，分片数据整块读入内存，大图仍需分片
            let is_image = content_type.starts_with("image");
            let chunk_size = if self.options.single_chunk_images
                && is_image
                && state.size <= self.options.single_chunk_limit
            {
                state.size.max(1)
            } else {
                self.options.chunk_size.max(1)
            };

            state.chunk_size = chunk_size;
            state.offset = 0;
            state.chunk_number = 1;
            state.chunk_count = state.size.div_ceil(chunk_size);
            state.retry_count = 0;
            state.continuation_id = None;
            state.progress = Progress::new(0, state.size);
            state.status = UploadStatus::Uploading;
            state.started_at = Some(chrono::Utc::now().timestamp());

            (state.name.clone(), state.size, state.chunk_count, content_type)
        };

        info!(
            "开始上传: {} ({}), upload_id={}",
            name,
            format_bytes(size),
            self.id
        );
        if chunk_count > 1 {
            debug!("{}: 分 {} 个分片上传", name, chunk_count);
        }

        self.events.trigger(UploadEvent::Start {
            upload_id: self.id.clone(),
            name,
            size,
        });

        match self.run(size, content_type).await {
            Ok(result) => self.complete(result),
            Err(UploadError::Canceled) => Err(UploadError::Canceled),
            Err(e) => self.fail(e),
        }
    }

    async fn run(&self, size: u64, content_type: String) -> Result<UploadResult, UploadError> {
        loop {
            let (number, offset, chunk_size, continuation_id) = {
                let state = self.state.lock();
                if state.status != UploadStatus::Uploading {
                    return Err(UploadError::Canceled);
                }
                (
                    state.chunk_number,
                    state.offset,
                    state.chunk_size,
                    state.continuation_id.clone(),
                )
            };

            let len = chunk_size.min(size - offset);
            let mut chunk = UploadChunk::new(number, offset, len);

            let ctx = ChunkContext {
                upload_id: self.id.clone(),
                source: Arc::clone(&self.source),
                transport: Arc::clone(&self.transport),
                url: self.options.url.clone(),
                method: self.options.method.clone(),
                content_type: content_type.clone(),
                authorization: self.options.authorization.as_ref().map(|a| a.header_value()),
                continuation_id,
                max_attempts: self.options.max_attempts,
                retry_delay: self.options.retry_delay,
                cancel_token: self.cancel_token.clone(),
                on_progress: self.progress_callback(offset, len),
                on_retry: Some(self.retry_callback()),
            };

            let result = chunk.send(&ctx).await?;

            let mut state = self.state.lock();
            if state.status != UploadStatus::Uploading {
                return Err(UploadError::Canceled);
            }

            state.chunk_number += 1;
            state.offset += chunk.size;
            state.retry_count = 0;
            state.progress.loaded = state.progress.loaded.max(state.offset);
            state.result = Some(result.clone());

            if state.offset >= size {
                return Ok(result);
            }

            state.continuation_id = Some(result.id);
        }
    }

    /// 分片进度回调：换算成相对整个文件的进度，只前进不后退
    fn progress_callback(&self, chunk_offset: u64, chunk_size: u64) -> ProgressCallback {
        let state = Arc::clone(&self.state);
        let events = Arc::clone(&self.events);
        let upload_id = self.id.clone();

        Arc::new(move |loaded| {
            let progress = {
                let mut state = state.lock();
                if state.status != UploadStatus::Uploading {
                    return;
                }

                let absolute = chunk_offset + loaded.min(chunk_size);
                if absolute <= state.progress.loaded {
                    return;
                }
                state.progress.loaded = absolute;
                state.progress
            };

            events.trigger(UploadEvent::Progress {
                upload_id: upload_id.clone(),
                loaded: progress.loaded,
                total: progress.total,
                value: progress.value(),
            });
        })
    }

    fn retry_callback(&self) -> Arc<dyn Fn(u32) + Send + Sync> {
        let state = Arc::clone(&self.state);
        Arc::new(move |attempt| {
            state.lock().retry_count = attempt;
        })
    }

    fn complete(&self, result: UploadResult) -> Result<UploadResult, UploadError> {
        let name = {
            let mut state = self.state.lock();
            if state.status != UploadStatus::Uploading {
                return Err(UploadError::Canceled);
            }
            state.status = UploadStatus::Completed;
            state.progress.loaded = state.size;
            state.completed_at = Some(chrono::Utc::now().timestamp());
            state.name.clone()
        };

        info!("上传完成: {}, id={}", name, result.id);

        self.events.trigger(UploadEvent::Complete {
            upload_id: self.id.clone(),
            result: Some(result.clone()),
        });
        self.outcome.settle(Ok(result.clone()));

        Ok(result)
    }

    fn fail(&self, error: UploadError) -> Result<UploadResult, UploadError> {
        let name = {
            let mut state = self.state.lock();
            if state.status != UploadStatus::Uploading {
                return Err(UploadError::Canceled);
            }
            state.status = UploadStatus::Error;
            state.error = Some(error.to_string());
            state.completed_at = Some(chrono::Utc::now().timestamp());
            state.name.clone()
        };

        error!("上传失败: {}, 错误: {}", name, error);

        self.events.trigger(UploadEvent::Error {
            upload_id: self.id.clone(),
            error: error.to_string(),
        });
        self.outcome.settle(Err(error.clone()));

        Err(error)
    }

    /// 取消上传
    ///
    /// 任意时刻调用都是安全的；已完成或失败的上传也会转为 Canceled
    /// 并发出 cancel 事件，但已有的结果不会被覆盖
    pub fn cancel(&self) {
        let (name, previous) = {
            let mut state = self.state.lock();
            if state.status == UploadStatus::Canceled {
                return;
            }
            let previous = state.status;
            state.status = UploadStatus::Canceled;
            if state.completed_at.is_none() {
                state.completed_at = Some(chrono::Utc::now().timestamp());
            }
            (state.name.clone(), previous)
        };

        self.cancel_token.cancel();

        info!("上传已取消: {} (之前状态: {})", name, previous.as_str());

        self.events.trigger(UploadEvent::Cancel {
            upload_id: self.id.clone(),
        });
        self.outcome.settle(Err(UploadError::Canceled));
    }

    /// 等待上传结束，可被任意多个调用方同时等待
    pub async fn outcome(&self) -> Result<UploadResult, UploadError> {
        self.outcome.wait().await
    }
}
