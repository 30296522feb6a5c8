// 上传错误类型定义

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 准入拒绝原因
///
/// 同步产生，不会进入网络层，只出现在 `add_files` 返回的批次中
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// 格式不在允许列表中
    Unsupported,
    /// 超过全局文件大小上限
    TooLarge,
    /// 已跟踪的上传数达到上限
    OverLimit,
}

impl RejectionReason {
    /// 面向用户的原因文本
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Unsupported => "Unsupported",
            RejectionReason::TooLarge => "Too large",
            RejectionReason::OverLimit => "Over limit",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 上传错误
///
/// 需要 Clone：同一个结果会通过 watch 通道分发给多个等待者
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// 对非 Pending 状态的上传调用 start()
    #[error("上传已开始")]
    AlreadyStarted,

    /// 上传被取消
    #[error("上传已取消")]
    Canceled,

    /// 服务器返回 413，不可重试
    #[error("文件过大 (HTTP 413)")]
    EntityTooLarge,

    /// 达到最大尝试次数
    #[error("分片上传失败，已尝试 {attempts} 次: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// 单次传输失败（可重试）
    #[error("传输错误: {0}")]
    Transport(String),

    /// 响应不是合法 JSON 或缺少 id（可重试）
    #[error("响应解析失败: {0}")]
    InvalidResponse(String),

    /// 被准入控制拒绝的上传不能启动
    #[error("上传已被拒绝: {0}")]
    Rejected(RejectionReason),

    /// 空文件没有可发送的分片
    #[error("文件为空，没有可上传的数据")]
    EmptyFile,

    /// 读取本地数据失败
    #[error("读取文件失败: {0}")]
    Io(String),
}

impl UploadError {
    /// 是否为单次尝试内可恢复的错误
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            UploadError::Transport(_) | UploadError::InvalidResponse(_)
        )
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Io(e.to_string())
    }
}
