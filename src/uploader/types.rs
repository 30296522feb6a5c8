// 上传公共类型定义

use crate::error::UploadError;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// 上传状态
///
/// 顺序有意义：`>= Uploading` 表示已经启动过，后三种为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// 等待中
    Pending,
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 已取消
    Canceled,
    /// 失败
    Error,
}

impl UploadStatus {
    /// 是否已经启动过
    pub fn is_started(&self) -> bool {
        *self >= UploadStatus::Uploading
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Canceled | UploadStatus::Error
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Canceled => "canceled",
            UploadStatus::Error => "error",
        }
    }
}

/// 服务器对分片请求的响应
///
/// 至少包含 `id`，其余已知字段可选，未知字段原样保留
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    /// 续传 ID，下一分片通过 X-Upload-Id 回传
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// 服务器已接收字节数（兼容旧字段名 transfered）
    #[serde(default, alias = "transfered", skip_serializing_if = "Option::is_none")]
    pub transferred: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UploadResult {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            size: None,
            hash: None,
            transferred: None,
            extra: serde_json::Map::new(),
        }
    }

    /// 解析响应体，不是合法 JSON 或缺少 id 时返回 InvalidResponse
    pub fn parse(body: &str) -> Result<Self, UploadError> {
        serde_json::from_str(body).map_err(|e| UploadError::InvalidResponse(e.to_string()))
    }
}

type Outcome = Option<Result<UploadResult, UploadError>>;

/// 上传最终结果：只写入一次，可被任意多个调用方等待
#[derive(Debug)]
pub(crate) struct OutcomeCell {
    tx: watch::Sender<Outcome>,
}

impl OutcomeCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// 只记录第一次结果，返回是否写入
    pub(crate) fn settle(&self, outcome: Result<UploadResult, UploadError>) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub(crate) async fn wait(&self) -> Result<UploadResult, UploadError> {
        let mut rx = self.tx.subscribe();
        let settled = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        settled.unwrap_or(Err(UploadError::Canceled))
    }
}
