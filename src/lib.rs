// Chunk Uploader Library
// 分片上传核心库

// 配置管理模块
pub mod config;

// 错误类型
pub mod error;

// 🔥 事件总线
pub mod events;

// 日志系统
pub mod logging;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, LogConfig, UploaderConfig};
pub use error::{RejectionReason, UploadError};
pub use events::{EventBus, ManagerEvent, Subscription, UploadEvent};
pub use uploader::{
    FileSource, HttpTransport, LocalFile, LocalFileUpload, MimeRegistry, PathPicker, PickedFile,
    Progress, RemoteLinkPicker, RemoteUrlUpload, Transferable, UploadHandle, UploadManager,
    UploadResult, UploadStatus,
};
