// 远程链接导入
//
// 由外部选择器（如云盘选择器）产生的"现成"上传：
// 不读取本地数据，只请求服务器从链接拉取文件

use crate::error::{RejectionReason, UploadError};
use crate::events::{EventBus, UploadEvent};
use crate::uploader::mime::{format_from_name, MimeRegistry};
use crate::uploader::progress::Progress;
use crate::uploader::transport::{Authorization, ChunkTransport, ImportRequest};
use crate::uploader::types::{OutcomeCell, UploadResult, UploadStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// 外部选择器返回的链接
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLink {
    /// 文件直链
    #[serde(alias = "link")]
    pub url: String,
    pub name: String,
    #[serde(alias = "bytes")]
    pub size: u64,
    #[serde(default, alias = "thumbnailLink")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone)]
struct RemoteState {
    status: UploadStatus,
    progress: Progress,
    rejection: Option<RejectionReason>,
    result: Option<UploadResult>,
    error: Option<String>,
}

/// 远程链接上传
pub struct RemoteUrlUpload {
    id: String,
    link: RemoteLink,
    format: String,
    mime_type: Option<String>,
    /// 来源服务名称
    source: String,
    endpoint: String,
    authorization: Option<Authorization>,
    transport: Arc<dyn ChunkTransport>,
    state: Mutex<RemoteState>,
    events: EventBus<UploadEvent>,
    cancel_token: CancellationToken,
    outcome: OutcomeCell,
}

impl fmt::Debug for RemoteUrlUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteUrlUpload")
            .field("id", &self.id)
            .field("url", &self.link.url)
            .field("source", &self.source)
            .field("status", &self.state.lock().status)
            .finish()
    }
}

impl RemoteUrlUpload {
    pub fn new(
        link: RemoteLink,
        source: impl Into<String>,
        endpoint: impl Into<String>,
        transport: Arc<dyn ChunkTransport>,
        mimes: &MimeRegistry,
    ) -> Self {
        let format = format_from_name(&link.name);
        let mime_type = mimes
            .media_kind(&format)
            .map(|kind| format!("{}/{}", kind, format));

        Self {
            id: Uuid::new_v4().to_string(),
            format,
            mime_type,
            source: source.into(),
            endpoint: endpoint.into(),
            authorization: None,
            transport,
            state: Mutex::new(RemoteState {
                status: UploadStatus::Pending,
                progress: Progress::new(0, link.size),
                rejection: None,
                result: None,
                error: None,
            }),
            link,
            events: EventBus::new(),
            cancel_token: CancellationToken::new(),
            outcome: OutcomeCell::new(),
        }
    }

    pub fn with_authorization(mut self, authorization: Option<Authorization>) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.link.url
    }

    pub fn name(&self) -> &str {
        &self.link.name
    }

    pub fn size(&self) -> u64 {
        self.link.size
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// 由媒体大类推导的类型，如 `image/png`
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.link.thumbnail_url.as_deref()
    }

    pub fn events(&self) -> &EventBus<UploadEvent> {
        &self.events
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

    pub fn reject(&self, reason: RejectionReason) {
        let mut state = self.state.lock();
        state.rejection = Some(reason);
        state.error = Some(reason.to_string());
    }

    pub fn result(&self) -> Option<UploadResult> {
        self.state.lock().result.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// 请求服务器导入链接
    pub async fn start(&self) -> Result<UploadResult, UploadError> {
        {
            let mut state = self.state.lock();
            if let Some(reason) = state.rejection {
                return Err(UploadError::Rejected(reason));
            }
            if state.status.is_started() {
                return Err(UploadError::AlreadyStarted);
            }
            state.status = UploadStatus::Uploading;
        }

        info!(
            "开始远程导入: {} ({}), 来源={}",
            self.link.name, self.link.url, self.source
        );

        self.events.trigger(UploadEvent::Start {
            upload_id: self.id.clone(),
            name: self.link.name.clone(),
            size: self.link.size,
        });
        self.events.trigger(UploadEvent::Progress {
            upload_id: self.id.clone(),
            loaded: 0,
            total: self.link.size,
            value: 0.0,
        });

        let request = ImportRequest {
            endpoint: self.endpoint.clone(),
            link: self.link.url.clone(),
            authorization: self.authorization.as_ref().map(|a| a.header_value()),
        };

        let response = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => return Err(UploadError::Canceled),
            response = self.transport.import(&request) => response,
        };

        match response
            .map_err(UploadError::from)
            .and_then(|r| UploadResult::parse(&r.body))
        {
            Ok(result) => self.complete(result),
            Err(e) => self.fail(e),
        }
    }

    fn complete(&self, result: UploadResult) -> Result<UploadResult, UploadError> {
        let progress = {
            let mut state = self.state.lock();
            if state.status != UploadStatus::Uploading {
                return Err(UploadError::Canceled);
            }
            state.status = UploadStatus::Completed;
            state.progress.loaded = self.link.size;
            state.result = Some(result.clone());
            state.progress
        };

        info!("远程导入完成: {}, id={}", self.link.name, result.id);

        self.events.trigger(UploadEvent::Progress {
            upload_id: self.id.clone(),
            loaded: progress.loaded,
            total: progress.total,
            value: progress.value(),
        });
        self.events.trigger(UploadEvent::Complete {
            upload_id: self.id.clone(),
            result: Some(result.clone()),
        });
        self.outcome.settle(Ok(result.clone()));

        Ok(result)
    }

    fn fail(&self, error: UploadError) -> Result<UploadResult, UploadError> {
        {
            let mut state = self.state.lock();
            if state.status != UploadStatus::Uploading {
                return Err(UploadError::Canceled);
            }
            state.status = UploadStatus::Error;
            state.error = Some(error.to_string());
        }

        error!("远程导入失败: {}, 错误: {}", self.link.name, error);

        self.events.trigger(UploadEvent::Error {
            upload_id: self.id.clone(),
            error: error.to_string(),
        });
        self.outcome.settle(Err(error.clone()));

        Err(error)
    }

    /// 取消导入，语义与本地上传一致
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock();
            if state.status == UploadStatus::Canceled {
                return;
            }
            state.status = UploadStatus::Canceled;
        }

        self.cancel_token.cancel();
        info!("远程导入已取消: {}", self.link.name);

        self.events.trigger(UploadEvent::Cancel {
            upload_id: self.id.clone(),
        });
        self.outcome.settle(Err(UploadError::Canceled));
    }

    pub async fn outcome(&self) -> Result<UploadResult, UploadError> {
        self.outcome.wait().await
    }
}
