// 可传输对象
//
// 上传管理器只依赖 Transferable，不关心是本地分片上传还是远程导入

use crate::error::{RejectionReason, UploadError};
use crate::events::{EventBus, UploadEvent};
use crate::uploader::progress::Progress;
use crate::uploader::remote::RemoteUrlUpload;
use crate::uploader::source::FileSource;
use crate::uploader::task::LocalFileUpload;
use crate::uploader::types::{UploadResult, UploadStatus};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// 上传管理器可调度的对象
#[async_trait]
pub trait Transferable: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn size(&self) -> u64;

    /// 小写扩展名，用于准入判定
    fn format(&self) -> &str;

    fn status(&self) -> UploadStatus;

    fn progress(&self) -> Progress;

    fn rejection(&self) -> Option<RejectionReason>;

    /// 标记为被拒绝
    fn reject(&self, reason: RejectionReason);

    fn events(&self) -> &EventBus<UploadEvent>;

    async fn start(&self) -> Result<UploadResult, UploadError>;

    fn cancel(&self);

    /// 等待最终结果
    async fn outcome(&self) -> Result<UploadResult, UploadError>;
}

/// 上传句柄
pub type UploadHandle = Arc<dyn Transferable>;

/// 选择器产生的文件
#[derive(Debug, Clone)]
pub enum PickedFile {
    /// 需要分片上传的原始文件
    Local(Arc<dyn FileSource>),
    /// 已经构造好的上传
    Ready(UploadHandle),
}

impl PickedFile {
    pub fn name(&self) -> &str {
        match self {
            PickedFile::Local(source) => source.name(),
            PickedFile::Ready(upload) => upload.name(),
        }
    }
}

impl From<Arc<dyn FileSource>> for PickedFile {
    fn from(source: Arc<dyn FileSource>) -> Self {
        PickedFile::Local(source)
    }
}

impl From<UploadHandle> for PickedFile {
    fn from(upload: UploadHandle) -> Self {
        PickedFile::Ready(upload)
    }
}

#[async_trait]
impl Transferable for LocalFileUpload {
    fn id(&self) -> &str {
        LocalFileUpload::id(self)
    }

    fn name(&self) -> &str {
        self.source().name()
    }

    fn size(&self) -> u64 {
        self.source().size()
    }

    fn format(&self) -> &str {
        LocalFileUpload::format(self)
    }

    fn status(&self) -> UploadStatus {
        LocalFileUpload::status(self)
    }

    fn progress(&self) -> Progress {
        LocalFileUpload::progress(self)
    }

    fn rejection(&self) -> Option<RejectionReason> {
        LocalFileUpload::rejection(self)
    }

    fn reject(&self, reason: RejectionReason) {
        LocalFileUpload::reject(self, reason)
    }

    fn events(&self) -> &EventBus<UploadEvent> {
        LocalFileUpload::events(self)
    }

    async fn start(&self) -> Result<UploadResult, UploadError> {
        LocalFileUpload::start(self).await
    }

    fn cancel(&self) {
        LocalFileUpload::cancel(self)
    }

    async fn outcome(&self) -> Result<UploadResult, UploadError> {
        LocalFileUpload::outcome(self).await
    }
}

#[async_trait]
impl Transferable for RemoteUrlUpload {
    fn id(&self) -> &str {
        RemoteUrlUpload::id(self)
    }

    fn name(&self) -> &str {
        RemoteUrlUpload::name(self)
    }

    fn size(&self) -> u64 {
        RemoteUrlUpload::size(self)
    }

    fn format(&self) -> &str {
        RemoteUrlUpload::format(self)
    }

    fn status(&self) -> UploadStatus {
        RemoteUrlUpload::status(self)
    }

    fn progress(&self) -> Progress {
        RemoteUrlUpload::progress(self)
    }

    fn rejection(&self) -> Option<RejectionReason> {
        RemoteUrlUpload::rejection(self)
    }

    fn reject(&self, reason: RejectionReason) {
        RemoteUrlUpload::reject(self, reason)
    }

    fn events(&self) -> &EventBus<UploadEvent> {
        RemoteUrlUpload::events(self)
    }

    async fn start(&self) -> Result<UploadResult, UploadError> {
        RemoteUrlUpload::start(self).await
    }

    fn cancel(&self) {
        RemoteUrlUpload::cancel(self)
    }

    async fn outcome(&self) -> Result<UploadResult, UploadError> {
        RemoteUrlUpload::outcome(self).await
    }
}
