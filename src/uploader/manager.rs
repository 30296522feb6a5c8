// 上传管理器
//
// 负责管理一组上传：
// - 准入控制（格式、大小、数量上限）
// - FIFO 队列，严格一个接一个上传
// - 汇总进度
// - 生命周期事件
//
// 所有状态都在短临界区内修改，不跨 await 持锁，也不在持锁时触发事件，
// 因此事件回调中可以安全地移除上传

use crate::error::{RejectionReason, UploadError};
use crate::events::{EventBus, ManagerEvent, Subscription, UploadEvent};
use crate::uploader::mime::MimeRegistry;
use crate::uploader::picker::{normalize_formats, FileBatch, Picker};
use crate::uploader::progress::Progress;
use crate::uploader::task::{LocalFileUpload, UploadOptions};
use crate::uploader::transferable::{PickedFile, UploadHandle};
use crate::uploader::transport::ChunkTransport;
use crate::uploader::types::UploadStatus;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// 默认最多跟踪的上传数
pub const DEFAULT_UPLOAD_LIMIT: i64 = 1000;

/// 默认单文件大小上限: 5GB
pub const DEFAULT_MAX_SIZE: u64 = 5_000_000_000;

/// 管理器参数
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// 每个本地上传使用的参数
    pub upload: UploadOptions,
    /// 最多跟踪的上传数，负数视为 0
    pub upload_limit: i64,
    pub max_size: u64,
    /// 允许的扩展名，None 表示不限制
    pub accept: Option<Vec<String>>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            upload: UploadOptions::default(),
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            max_size: DEFAULT_MAX_SIZE,
            accept: None,
        }
    }
}

/// 一次 add_files 的准入结果
#[derive(Debug, Clone, Default)]
pub struct UploadBatch {
    pub queued: Vec<UploadHandle>,
    pub rejected: Vec<UploadHandle>,
}

/// 一轮 start() 的汇总
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub status: UploadStatus,
    /// 成功数
    pub completed: usize,
    /// 失败或取消数
    pub canceled: usize,
    /// 仍在跟踪的上传数
    pub tracked: usize,
    pub progress: Progress,
}

struct ManagerState {
    status: UploadStatus,
    queue: VecDeque<UploadHandle>,
    uploads: Vec<UploadHandle>,
    completed_count: usize,
    canceled_count: usize,
    upload_limit: usize,
    max_size: u64,
    accept: Option<Vec<String>>,
    progress: Progress,
    sources: Vec<(Arc<dyn Picker>, Subscription<FileBatch>)>,
}

struct ManagerInner {
    upload_options: UploadOptions,
    transport: Arc<dyn ChunkTransport>,
    mimes: Arc<MimeRegistry>,
    state: Mutex<ManagerState>,
    events: EventBus<ManagerEvent>,
}

/// 上传管理器
#[derive(Clone)]
pub struct UploadManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for UploadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("UploadManager")
            .field("status", &state.status)
            .field("queue", &state.queue.len())
            .field("uploads", &state.uploads.len())
            .finish()
    }
}

fn floor_limit(limit: i64) -> usize {
    limit.max(0) as usize
}

impl UploadManager {
    pub fn new(
        options: ManagerOptions,
        transport: Arc<dyn ChunkTransport>,
        mimes: Arc<MimeRegistry>,
    ) -> Self {
        let state = ManagerState {
            status: UploadStatus::Pending,
            queue: VecDeque::new(),
            uploads: Vec::new(),
            completed_count: 0,
            canceled_count: 0,
            upload_limit: floor_limit(options.upload_limit),
            max_size: options.max_size,
            accept: options.accept.as_deref().map(normalize_formats),
            progress: Progress::default(),
            sources: Vec::new(),
        };

        Self {
            inner: Arc::new(ManagerInner {
                upload_options: options.upload,
                transport,
                mimes,
                state: Mutex::new(state),
                events: EventBus::new(),
            }),
        }
    }

    pub fn events(&self) -> &EventBus<ManagerEvent> {
        &self.inner.events
    }

    pub fn status(&self) -> UploadStatus {
        self.inner.state.lock().status
    }

    pub fn progress(&self) -> Progress {
        self.inner.state.lock().progress
    }

    /// 所有已准入的上传
    pub fn uploads(&self) -> Vec<UploadHandle> {
        self.inner.state.lock().uploads.clone()
    }

    /// 尚未开始的上传
    pub fn queue(&self) -> Vec<UploadHandle> {
        self.inner.state.lock().queue.iter().cloned().collect()
    }

    pub fn completed_count(&self) -> usize {
        self.inner.state.lock().completed_count
    }

    pub fn canceled_count(&self) -> usize {
        self.inner.state.lock().canceled_count
    }

    pub fn upload_limit(&self) -> usize {
        self.inner.state.lock().upload_limit
    }

    /// 设置跟踪上限，负数视为 0
    pub fn set_upload_limit(&self, limit: i64) {
        self.inner.state.lock().upload_limit = floor_limit(limit);
    }

    pub fn max_size(&self) -> u64 {
        self.inner.state.lock().max_size
    }

    pub fn accept(&self) -> Option<Vec<String>> {
        self.inner.state.lock().accept.clone()
    }

    /// 是否接受该格式，未配置允许列表时全部接受
    pub fn accepts(&self, format: &str) -> bool {
        let state = self.inner.state.lock();
        Self::accepts_in(&state, format)
    }

    fn accepts_in(state: &ManagerState, format: &str) -> bool {
        let format = format.to_lowercase();
        state
            .accept
            .as_ref()
            .map_or(true, |list| list.iter().any(|a| *a == format))
    }

    /// 包装并做准入判定
    ///
    /// 无论是否准入，上传的 cancel 事件都会触发 remove_upload
    pub fn queue_file(&self, file: PickedFile) -> UploadHandle {
        let upload: UploadHandle = match file {
            PickedFile::Local(source) => Arc::new(LocalFileUpload::new(
                source,
                self.inner.upload_options.clone(),
                Arc::clone(&self.inner.transport),
                Arc::clone(&self.inner.mimes),
            )),
            PickedFile::Ready(upload) => upload,
        };

        let rejection = {
            let mut state = self.inner.state.lock();

            if state.uploads.iter().any(|u| u.id() == upload.id()) {
                debug!("上传已在跟踪列表中: {}", upload.name());
                return upload;
            }

            let rejection = if !Self::accepts_in(&state, upload.format()) {
                Some(RejectionReason::Unsupported)
            } else if upload.size() > state.max_size {
                Some(RejectionReason::TooLarge)
            } else if state.uploads.len() >= state.upload_limit {
                Some(RejectionReason::OverLimit)
            } else {
                None
            };

            if rejection.is_none() {
                state.queue.push_back(Arc::clone(&upload));
                state.uploads.push(Arc::clone(&upload));
            }

            rejection
        };

        self.wire_cancel(&upload);

        match rejection {
            Some(reason) => {
                warn!("文件被拒绝: {} ({})", upload.name(), reason);
                upload.reject(reason);
            }
            None => debug!("文件已加入队列: {}", upload.name()),
        }

        upload
    }

    /// 上传被取消时移出跟踪列表
    fn wire_cancel(&self, upload: &UploadHandle) {
        let inner: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let upload_id = upload.id().to_string();

        upload.events().on("cancel", move |_: &UploadEvent| {
            if let Some(inner) = inner.upgrade() {
                UploadManager { inner }.remove_by_id(&upload_id);
            }
        });
    }

    /// 批量添加文件，发出一次 add 事件
    pub fn add_files<I>(&self, files: I) -> UploadBatch
    where
        I: IntoIterator<Item = PickedFile>,
    {
        let mut batch = UploadBatch::default();

        for file in files {
            let upload = self.queue_file(file);
            if upload.rejection().is_some() {
                batch.rejected.push(upload);
            } else {
                batch.queued.push(upload);
            }
        }

        if batch.queued.is_empty() && batch.rejected.is_empty() {
            return batch;
        }

        info!(
            "添加文件: {} 个排队, {} 个被拒绝",
            batch.queued.len(),
            batch.rejected.len()
        );

        self.inner.events.trigger(ManagerEvent::Add {
            queued: batch.queued.clone(),
            rejected: batch.rejected.clone(),
        });

        batch
    }

    /// 订阅文件来源
    pub fn add_source(&self, picker: Arc<dyn Picker>) {
        if let Some(accept) = self.accept() {
            picker.set_accept(&accept);
        }

        let inner = Arc::downgrade(&self.inner);
        let subscription = picker.subscribe(Box::new(move |batch: &FileBatch| {
            if let Some(inner) = inner.upgrade() {
                UploadManager { inner }.add_files(batch.files.clone());
            }
        }));

        self.inner.state.lock().sources.push((picker, subscription));
    }

    /// 移出跟踪列表，不存在时忽略
    pub fn remove_upload(&self, upload: &UploadHandle) {
        self.remove_by_id(upload.id());
    }

    fn remove_by_id(&self, upload_id: &str) {
        let removed = {
            let mut state = self.inner.state.lock();
            state.queue.retain(|u| u.id() != upload_id);
            let index = state.uploads.iter().position(|u| u.id() == upload_id);
            index.map(|index| state.uploads.remove(index))
        };

        if let Some(upload) = removed {
            debug!("移除上传: {}", upload.name());
            self.inner.events.trigger(ManagerEvent::Remove { upload });
        }
    }

    /// 依次上传队列中的所有文件
    ///
    /// 单个文件失败不会中断队列；管理器被取消时提前返回，不发出 complete
    pub async fn start(&self) -> Result<UploadSummary, UploadError> {
        let queued = {
            let mut state = self.inner.state.lock();
            if state.status == UploadStatus::Uploading {
                return Err(UploadError::AlreadyStarted);
            }
            state.status = UploadStatus::Uploading;
            state.queue.len()
        };

        info!("开始上传队列: {} 个文件", queued);
        self.inner.events.trigger(ManagerEvent::Start);

        loop {
            let next = {
                let mut state = self.inner.state.lock();
                if state.status != UploadStatus::Uploading {
                    info!("上传队列已取消");
                    return Ok(Self::summary(&state));
                }
                state.queue.pop_front()
            };

            let Some(upload) = next else {
                break;
            };

            let inner = Arc::downgrade(&self.inner);
            let progress_subscription = upload.events().on("progress", move |_| {
                if let Some(inner) = inner.upgrade() {
                    UploadManager { inner }.refresh_progress();
                }
            });

            self.inner.events.trigger(ManagerEvent::UploadStart {
                upload: Arc::clone(&upload),
            });

            let result = match upload.start().await {
                Err(UploadError::AlreadyStarted) => upload.outcome().await,
                other => other,
            };

            progress_subscription.dispose();

            match result {
                Ok(_) => {
                    self.inner.events.trigger(ManagerEvent::UploadComplete {
                        upload: Arc::clone(&upload),
                    });
                    self.inner.state.lock().completed_count += 1;
                }
                Err(error) => {
                    warn!("上传未完成: {}, 原因: {}", upload.name(), error);
                    self.inner.events.trigger(ManagerEvent::UploadError {
                        upload: Arc::clone(&upload),
                        error,
                    });
                    self.inner.state.lock().canceled_count += 1;
                }
            }

            self.refresh_progress();
        }

        let (uploads, summary) = {
            let mut state = self.inner.state.lock();
            if state.status != UploadStatus::Uploading {
                return Ok(Self::summary(&state));
            }
            state.status = UploadStatus::Completed;
            (state.uploads.clone(), Self::summary(&state))
        };

        info!(
            "上传队列完成: 成功 {} 个, 失败 {} 个",
            summary.completed, summary.canceled
        );

        self.inner
            .events
            .trigger(ManagerEvent::Complete { uploads });

        Ok(summary)
    }

    fn summary(state: &ManagerState) -> UploadSummary {
        UploadSummary {
            status: state.status,
            completed: state.completed_count,
            canceled: state.canceled_count,
            tracked: state.uploads.len(),
            progress: state.progress,
        }
    }

    /// 重新计算汇总进度：所有跟踪中的上传的已传字节 / 总字节
    fn refresh_progress(&self) {
        let progress = {
            let mut state = self.inner.state.lock();
            let (loaded, total) = state
                .uploads
                .iter()
                .fold((0u64, 0u64), |(loaded, total), upload| {
                    (loaded + upload.progress().loaded, total + upload.size())
                });
            state.progress = Progress::new(loaded, total);
            state.progress
        };

        self.inner.events.trigger(ManagerEvent::Progress {
            loaded: progress.loaded,
            total: progress.total,
            value: progress.value(),
        });
    }

    /// 取消所有上传
    pub fn cancel(&self) {
        let uploads = {
            let mut state = self.inner.state.lock();
            state.status = UploadStatus::Canceled;
            state.uploads.clone()
        };

        info!("取消上传管理器: {} 个上传", uploads.len());

        // 取消会触发 remove_upload，因此先复制一份再遍历
        for upload in uploads {
            upload.cancel();
        }

        self.inner.events.trigger(ManagerEvent::Cancel);
    }

    pub fn dispose(&self) {
        self.cancel();
    }

    /// 清空队列、跟踪列表和计数，并清空所有来源的选择
    pub fn reset(&self) {
        let pickers: Vec<Arc<dyn Picker>> = {
            let mut state = self.inner.state.lock();
            state.queue.clear();
            state.uploads.clear();
            state.completed_count = 0;
            state.canceled_count = 0;
            state.progress = Progress::default();
            state.status = UploadStatus::Pending;
            state.sources.iter().map(|(p, _)| Arc::clone(p)).collect()
        };

        for picker in pickers {
            picker.clear();
        }

        debug!("上传管理器已重置");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::source::{FileSource, MemoryFile};
    use crate::uploader::testing::{MockReply, MockTransport};
    use std::time::Duration;

    fn manager_with(options: ManagerOptions, transport: Arc<MockTransport>) -> UploadManager {
        UploadManager::new(options, transport, Arc::new(MimeRegistry::new()))
    }

    fn fast_options(chunk_size: u64) -> ManagerOptions {
        ManagerOptions {
            upload: UploadOptions {
                url: "http://localhost/upload".to_string(),
                chunk_size,
                retry_delay: Duration::from_millis(5),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn file(name: &str, size: usize) -> PickedFile {
        let source: Arc<dyn FileSource> = Arc::new(MemoryFile::new(name, vec![0u8; size]));
        PickedFile::Local(source)
    }

    fn record(manager: &UploadManager) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        manager.events().subscribe_filtered(
            move |e: &ManagerEvent| log_clone.lock().push(e.event_type_name().to_string()),
            |e| e.event_type_name() != "progress",
        );
        log
    }

    #[test]
    fn test_unsupported_format_rejected() {
        let manager = manager_with(
            ManagerOptions {
                accept: Some(vec!["png".to_string()]),
                ..fast_options(1024)
            },
            MockTransport::new(),
        );

        let upload = manager.queue_file(file("report.pdf", 10));

        assert_eq!(upload.rejection(), Some(RejectionReason::Unsupported));
        assert!(manager.queue().is_empty());
        assert!(manager.uploads().is_empty());
        assert!(manager.accepts("PNG"));
        assert!(!manager.accepts("pdf"));
    }

    #[test]
    fn test_upload_limit_zero_rejects_everything() {
        let manager = manager_with(
            ManagerOptions {
                upload_limit: -5,
                ..fast_options(1024)
            },
            MockTransport::new(),
        );
        assert_eq!(manager.upload_limit(), 0);

        for name in ["a.bin", "b.bin"] {
            let upload = manager.queue_file(file(name, 1));
            assert_eq!(upload.rejection(), Some(RejectionReason::OverLimit));
        }
        assert!(manager.uploads().is_empty());
    }

    #[test]
    fn test_rejection_precedence() {
        let manager = manager_with(
            ManagerOptions {
                accept: Some(vec!["bin".to_string()]),
                max_size: 10,
                upload_limit: 1,
                ..fast_options(1024)
            },
            MockTransport::new(),
        );

        // 格式优先于大小
        assert_eq!(
            manager.queue_file(file("huge.pdf", 100)).rejection(),
            Some(RejectionReason::Unsupported)
        );
        // 大小优先于数量
        assert!(manager.queue_file(file("a.bin", 5)).rejection().is_none());
        assert_eq!(
            manager.queue_file(file("huge.bin", 100)).rejection(),
            Some(RejectionReason::TooLarge)
        );
        assert_eq!(
            manager.queue_file(file("b.bin", 5)).rejection(),
            Some(RejectionReason::OverLimit)
        );

        manager.set_upload_limit(2);
        assert!(manager.queue_file(file("c.bin", 5)).rejection().is_none());
        assert_eq!(manager.uploads().len(), 2);
    }

    #[test]
    fn test_mixed_batch_emits_single_add() {
        let manager = manager_with(
            ManagerOptions {
                max_size: 100,
                ..fast_options(1024)
            },
            MockTransport::new(),
        );

        let added = Arc::new(Mutex::new(Vec::new()));
        let added_clone = Arc::clone(&added);
        manager.events().on("add", move |e| {
            if let ManagerEvent::Add { queued, rejected } = e {
                added_clone.lock().push((
                    queued.iter().map(|u| u.id().to_string()).collect::<Vec<_>>(),
                    rejected.iter().map(|u| u.id().to_string()).collect::<Vec<_>>(),
                ));
            }
        });

        let batch = manager.add_files(vec![
            file("a.bin", 10),
            file("big.bin", 1000),
            file("b.bin", 20),
        ]);

        assert_eq!(batch.queued.len(), 2);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(
            batch.rejected[0].rejection(),
            Some(RejectionReason::TooLarge)
        );

        let added = added.lock();
        assert_eq!(added.len(), 1);
        let queued_ids: Vec<String> = batch.queued.iter().map(|u| u.id().to_string()).collect();
        let rejected_ids: Vec<String> = batch.rejected.iter().map(|u| u.id().to_string()).collect();
        assert_eq!(added[0], (queued_ids, rejected_ids));
    }

    #[test]
    fn test_empty_add_emits_nothing() {
        let manager = manager_with(fast_options(1024), MockTransport::new());
        let events = record(&manager);

        let batch = manager.add_files(Vec::new());

        assert!(batch.queued.is_empty() && batch.rejected.is_empty());
        assert!(events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_start_drains_queue_sequentially() {
        let transport = MockTransport::new();
        let manager = manager_with(fast_options(4), transport.clone());
        let events = record(&manager);

        manager.add_files(vec![file("a.bin", 10), file("b.bin", 3), file("c.bin", 5)]);
        let summary = manager.start().await.unwrap();

        assert_eq!(summary.status, UploadStatus::Completed);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.canceled, 0);
        assert_eq!(manager.completed_count(), 3);
        assert!(manager.queue().is_empty());
        assert_eq!(manager.progress(), Progress::new(18, 18));
        assert_eq!(transport.calls(), 3 + 1 + 2);

        // upload:start 与 upload:complete 严格交替
        let events = events.lock().clone();
        assert_eq!(
            events,
            vec![
                "add",
                "start",
                "upload:start",
                "upload:complete",
                "upload:start",
                "upload:complete",
                "upload:start",
                "upload:complete",
                "complete",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_upload_does_not_stop_queue() {
        let transport = MockTransport::scripted(vec![MockReply::Status(413, "".to_string())]);
        let manager = manager_with(fast_options(1024), transport);
        let events = record(&manager);

        manager.add_files(vec![file("a.bin", 10), file("b.bin", 10)]);
        let summary = manager.start().await.unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.canceled, 1);
        assert_eq!(
            manager.uploads()[0].status(),
            UploadStatus::Error
        );
        assert_eq!(
            events.lock()[2..].to_vec(),
            vec!["upload:start", "upload:error", "upload:start", "upload:complete", "complete"]
        );
    }

    #[tokio::test]
    async fn test_progress_events_aggregate() {
        let manager = manager_with(fast_options(5), MockTransport::new());

        let values = Arc::new(Mutex::new(Vec::new()));
        let values_clone = Arc::clone(&values);
        manager.events().on("progress", move |e| {
            if let ManagerEvent::Progress { loaded, total, .. } = e {
                values_clone.lock().push((*loaded, *total));
            }
        });

        manager.add_files(vec![file("a.bin", 10), file("b.bin", 10)]);
        manager.start().await.unwrap();

        let values = values.lock().clone();
        assert!(values.iter().all(|(_, total)| *total == 20));
        assert!(values.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(values.last(), Some(&(20, 20)));
    }

    #[tokio::test]
    async fn test_cancel_mid_upload_removes_it() {
        let transport = MockTransport::scripted(vec![
            MockReply::Ok(r#"{"id":"first"}"#.to_string()),
            MockReply::Hang,
        ]);
        let manager = manager_with(fast_options(3), transport.clone());
        let events = record(&manager);

        let upload = Arc::new(LocalFileUpload::new(
            Arc::new(MemoryFile::new("data.bin", vec![0u8; 9])),
            fast_options(3).upload,
            transport.clone(),
            Arc::new(MimeRegistry::new()),
        ));
        let handle: UploadHandle = upload.clone();
        manager.add_files(vec![PickedFile::Ready(handle)]);

        let runner = manager.clone();
        let driver = tokio::spawn(async move { runner.start().await });

        transport.wait_for_hang().await;
        assert_eq!(
            manager.start().await.unwrap_err(),
            UploadError::AlreadyStarted
        );
        manager.cancel();

        let summary = driver.await.unwrap().unwrap();
        assert_eq!(summary.status, UploadStatus::Canceled);
        assert_eq!(summary.canceled, 1);

        let state = upload.snapshot();
        assert_eq!(state.status, UploadStatus::Canceled);
        assert_eq!(state.offset, 3);
        assert!(state.offset < state.size);
        assert_eq!(upload.outcome().await.unwrap_err(), UploadError::Canceled);

        assert!(manager.uploads().is_empty());
        assert!(manager.queue().is_empty());

        let events = events.lock().clone();
        assert!(events.contains(&"remove".to_string()));
        assert!(events.contains(&"cancel".to_string()));
        assert!(!events.contains(&"complete".to_string()));
    }

    #[test]
    fn test_cancel_queued_upload_is_removed() {
        let manager = manager_with(fast_options(1024), MockTransport::new());
        let batch = manager.add_files(vec![file("a.bin", 1), file("b.bin", 1)]);

        batch.queued[0].cancel();

        assert_eq!(manager.uploads().len(), 1);
        assert_eq!(manager.queue().len(), 1);
        assert_eq!(manager.queue()[0].id(), batch.queued[1].id());
    }

    #[test]
    fn test_remove_upload_tolerates_absence() {
        let manager = manager_with(fast_options(1024), MockTransport::new());
        let events = record(&manager);

        let upload = manager.queue_file(file("a.bin", 1));
        manager.remove_upload(&upload);
        manager.remove_upload(&upload);

        assert!(manager.uploads().is_empty());
        assert_eq!(*events.lock(), vec!["remove"]);
    }

    #[test]
    fn test_queue_same_upload_twice() {
        let manager = manager_with(fast_options(1024), MockTransport::new());
        let upload = manager.queue_file(file("a.bin", 1));

        manager.queue_file(PickedFile::Ready(Arc::clone(&upload)));

        assert_eq!(manager.uploads().len(), 1);
        assert_eq!(manager.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let manager = manager_with(fast_options(1024), MockTransport::new());
        manager.add_files(vec![file("a.bin", 1)]);
        manager.start().await.unwrap();

        manager.reset();

        assert!(manager.uploads().is_empty());
        assert_eq!(manager.completed_count(), 0);
        assert_eq!(manager.progress(), Progress::default());
        assert_eq!(manager.status(), UploadStatus::Pending);
    }

    #[tokio::test]
    async fn test_add_source_receives_batches() {
        use crate::uploader::picker::PathPicker;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("keep.png"), "1").unwrap();
        std::fs::write(temp_dir.path().join("drop.txt"), "2").unwrap();

        let manager = manager_with(
            ManagerOptions {
                accept: Some(vec![".PNG".to_string()]),
                ..fast_options(1024)
            },
            MockTransport::new(),
        );

        let picker = Arc::new(PathPicker::new());
        manager.add_source(picker.clone());

        picker.pick(vec![temp_dir.path()]).await.unwrap();

        let uploads = manager.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name(), "keep.png");

        manager.reset();
        assert!(picker.selection().is_empty());
    }
}
