// 分片上传模块
//
// - 单个文件按固定大小切片，顺序发送，分片级别有限次重试
// - 上传管理器负责准入控制和 FIFO 队列，一次只上传一个文件
// - 各层状态通过各自的事件总线对外发布

pub mod chunk;
pub mod folder;
pub mod manager;
pub mod mime;
pub mod picker;
pub mod progress;
pub mod remote;
pub mod source;
pub mod task;
pub mod transferable;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use chunk::{
    ChunkContext, UploadChunk, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
    DEFAULT_SINGLE_CHUNK_LIMIT,
};
pub use folder::{FolderScanner, ScanOptions, ScannedFile};
pub use manager::{
    ManagerOptions, UploadBatch, UploadManager, UploadSummary, DEFAULT_MAX_SIZE,
    DEFAULT_UPLOAD_LIMIT,
};
pub use mime::{format_from_name, MimeRegistry, DEFAULT_CONTENT_TYPE};
pub use picker::{load_links, FileBatch, PathPicker, Picker, RemoteLinkPicker};
pub use progress::{format_bytes, Progress};
pub use remote::{RemoteLink, RemoteUrlUpload};
pub use source::{FileSource, LocalFile, MemoryFile};
pub use task::{LocalFileUpload, UploadOptions, UploadState};
pub use transferable::{PickedFile, Transferable, UploadHandle};
pub use transport::{
    Authorization, ChunkRequest, ChunkTransport, ContentRange, HttpTransport, ImportRequest,
    ProgressCallback, TransportError, TransportResponse,
};
pub use types::{UploadResult, UploadStatus};
