//! 上传事件类型定义
//!
//! `UploadEvent` 由单个上传发布，`ManagerEvent` 由上传管理器发布

use crate::error::UploadError;
use crate::events::BusEvent;
use crate::uploader::{UploadHandle, UploadResult};
use serde::{Deserialize, Serialize};

/// 单个上传的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 开始上传
    Start {
        upload_id: String,
        name: String,
        size: u64,
    },
    /// 进度更新（相对整个文件）
    Progress {
        upload_id: String,
        loaded: u64,
        total: u64,
        value: f64,
    },
    /// 上传完成
    Complete {
        upload_id: String,
        result: Option<UploadResult>,
    },
    /// 上传失败
    Error { upload_id: String, error: String },
    /// 上传取消
    Cancel { upload_id: String },
}

impl UploadEvent {
    /// 获取上传 ID
    pub fn upload_id(&self) -> &str {
        match self {
            UploadEvent::Start { upload_id, .. } => upload_id,
            UploadEvent::Progress { upload_id, .. } => upload_id,
            UploadEvent::Complete { upload_id, .. } => upload_id,
            UploadEvent::Error { upload_id, .. } => upload_id,
            UploadEvent::Cancel { upload_id } => upload_id,
        }
    }

    /// 获取事件类型名称
    pub fn event_type_name(&self) -> &'static str {
        match self {
            UploadEvent::Start { .. } => "start",
            UploadEvent::Progress { .. } => "progress",
            UploadEvent::Complete { .. } => "complete",
            UploadEvent::Error { .. } => "error",
            UploadEvent::Cancel { .. } => "cancel",
        }
    }
}

impl BusEvent for UploadEvent {
    fn event_type(&self) -> &str {
        self.event_type_name()
    }

    fn named(name: &str) -> Option<Self> {
        let upload_id = String::new();
        let event = match name {
            "start" => UploadEvent::Start {
                upload_id,
                name: String::new(),
                size: 0,
            },
            "progress" => UploadEvent::Progress {
                upload_id,
                loaded: 0,
                total: 0,
                value: 0.0,
            },
            "complete" => UploadEvent::Complete {
                upload_id,
                result: None,
            },
            "error" => UploadEvent::Error {
                upload_id,
                error: String::new(),
            },
            "cancel" => UploadEvent::Cancel { upload_id },
            _ => return None,
        };
        Some(event)
    }
}

/// 上传管理器事件
///
/// 携带上传句柄而不是快照，订阅方可以直接对句柄调用 cancel 等操作
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// 一批文件完成准入判定
    Add {
        queued: Vec<UploadHandle>,
        rejected: Vec<UploadHandle>,
    },
    /// 开始处理队列
    Start,
    /// 队首上传开始
    UploadStart { upload: UploadHandle },
    /// 单个上传成功
    UploadComplete { upload: UploadHandle },
    /// 单个上传失败或被取消
    UploadError {
        upload: UploadHandle,
        error: UploadError,
    },
    /// 批次整体进度
    Progress { loaded: u64, total: u64, value: f64 },
    /// 队列处理完毕
    Complete { uploads: Vec<UploadHandle> },
    /// 管理器被取消
    Cancel,
    /// 上传被移出跟踪列表
    Remove { upload: UploadHandle },
}

impl ManagerEvent {
    /// 获取事件类型名称
    pub fn event_type_name(&self) -> &'static str {
        match self {
            ManagerEvent::Add { .. } => "add",
            ManagerEvent::Start => "start",
            ManagerEvent::UploadStart { .. } => "upload:start",
            ManagerEvent::UploadComplete { .. } => "upload:complete",
            ManagerEvent::UploadError { .. } => "upload:error",
            ManagerEvent::Progress { .. } => "progress",
            ManagerEvent::Complete { .. } => "complete",
            ManagerEvent::Cancel => "cancel",
            ManagerEvent::Remove { .. } => "remove",
        }
    }

    /// 事件关联的上传（如有）
    pub fn upload(&self) -> Option<&UploadHandle> {
        match self {
            ManagerEvent::UploadStart { upload }
            | ManagerEvent::UploadComplete { upload }
            | ManagerEvent::UploadError { upload, .. }
            | ManagerEvent::Remove { upload } => Some(upload),
            _ => None,
        }
    }
}

impl BusEvent for ManagerEvent {
    fn event_type(&self) -> &str {
        self.event_type_name()
    }

    /// 携带上传句柄的事件无法凭名称构造
    fn named(name: &str) -> Option<Self> {
        let event = match name {
            "add" => ManagerEvent::Add {
                queued: Vec::new(),
                rejected: Vec::new(),
            },
            "start" => ManagerEvent::Start,
            "progress" => ManagerEvent::Progress {
                loaded: 0,
                total: 0,
                value: 0.0,
            },
            "complete" => ManagerEvent::Complete {
                uploads: Vec::new(),
            },
            "cancel" => ManagerEvent::Cancel,
            _ => return None,
        };
        Some(event)
    }
}
