// 文件选择器
//
// 选择器是文件的外部来源，只负责产出文件批次；
// 上传管理器通过 add_source 订阅这些批次

use crate::events::{EventBus, Subscription};
use crate::uploader::folder::{FolderScanner, ScanOptions};
use crate::uploader::mime::{format_from_name, MimeRegistry};
use crate::uploader::remote::{RemoteLink, RemoteUrlUpload};
use crate::uploader::source::{FileSource, LocalFile};
use crate::uploader::transferable::{PickedFile, UploadHandle};
use crate::uploader::transport::{Authorization, ChunkTransport};
use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 一次选择产生的文件
#[derive(Debug, Clone, Default)]
pub struct FileBatch {
    pub files: Vec<PickedFile>,
}

impl FileBatch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub type BatchCallback = Box<dyn Fn(&FileBatch) + Send + Sync>;

/// 文件来源
pub trait Picker: Send + Sync {
    /// 订阅选择结果
    fn subscribe(&self, callback: BatchCallback) -> Subscription<FileBatch>;

    /// 清空上一次的选择
    fn clear(&self) {}

    /// 限制可选择的扩展名
    fn set_accept(&self, _formats: &[String]) {}
}

/// 规范化扩展名列表：去掉前导点并转小写
pub fn normalize_formats(formats: &[String]) -> Vec<String> {
    formats
        .iter()
        .map(|f| f.trim().trim_start_matches('.').to_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}

fn accepted(accept: &Option<Vec<String>>, format: &str) -> bool {
    accept
        .as_ref()
        .map_or(true, |list| list.iter().any(|a| a == format))
}

/// 本地路径选择器
///
/// 相当于原生文件对话框：目录会被展开，格式不在允许列表中的文件被过滤掉
pub struct PathPicker {
    events: EventBus<FileBatch>,
    accept: RwLock<Option<Vec<String>>>,
    scan_options: ScanOptions,
    selection: Mutex<Vec<PathBuf>>,
}

impl Default for PathPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl PathPicker {
    pub fn new() -> Self {
        Self::with_scan_options(ScanOptions {
            skip_hidden: true,
            ..Default::default()
        })
    }

    pub fn with_scan_options(scan_options: ScanOptions) -> Self {
        Self {
            events: EventBus::new(),
            accept: RwLock::new(None),
            scan_options,
            selection: Mutex::new(Vec::new()),
        }
    }

    pub fn scan_options(&self) -> &ScanOptions {
        &self.scan_options
    }

    /// 上一次选择的文件
    pub fn selection(&self) -> Vec<PathBuf> {
        self.selection.lock().clone()
    }

    /// 选择一组路径并通知订阅者
    ///
    /// 无法打开的文件会被跳过；目录展开失败返回错误
    pub async fn pick<I, P>(&self, paths: I) -> Result<FileBatch>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let accept = self.accept.read().clone();
        let mut selected = Vec::new();

        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                let scanner = FolderScanner::with_options(ScanOptions {
                    accept: accept.clone(),
                    ..self.scan_options.clone()
                });
                selected.extend(scanner.scan(path)?.into_iter().map(|f| f.path));
            } else {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if accepted(&accept, &format_from_name(&name)) {
                    selected.push(path.to_path_buf());
                } else {
                    debug!("过滤不支持的文件: {}", path.display());
                }
            }
        }

        let mut batch = FileBatch::default();
        let mut opened = Vec::with_capacity(selected.len());

        for path in selected {
            match LocalFile::open(&path).await {
                Ok(file) => {
                    let source: Arc<dyn FileSource> = Arc::new(file);
                    batch.files.push(PickedFile::Local(source));
                    opened.push(path);
                }
                Err(e) => warn!("打开文件失败: {}, 错误: {}", path.display(), e),
            }
        }

        info!("选择了 {} 个文件", batch.len());

        *self.selection.lock() = opened;
        self.events.trigger(batch.clone());

        Ok(batch)
    }
}

impl Picker for PathPicker {
    fn subscribe(&self, callback: BatchCallback) -> Subscription<FileBatch> {
        self.events.subscribe(callback)
    }

    fn clear(&self) {
        self.selection.lock().clear();
    }

    fn set_accept(&self, formats: &[String]) {
        *self.accept.write() = Some(normalize_formats(formats));
    }
}

/// 外部云盘选择器
///
/// 用户在第三方服务中选中的链接被转换为远程导入上传
pub struct RemoteLinkPicker {
    service: String,
    endpoint: String,
    authorization: Option<Authorization>,
    transport: Arc<dyn ChunkTransport>,
    mimes: Arc<MimeRegistry>,
    accept: RwLock<Option<Vec<String>>>,
    events: EventBus<FileBatch>,
}

impl RemoteLinkPicker {
    pub fn new(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        transport: Arc<dyn ChunkTransport>,
        mimes: Arc<MimeRegistry>,
    ) -> Self {
        Self {
            service: service.into(),
            endpoint: endpoint.into(),
            authorization: None,
            transport,
            mimes,
            accept: RwLock::new(None),
            events: EventBus::new(),
        }
    }

    pub fn with_authorization(mut self, authorization: Option<Authorization>) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// 导入接口地址
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 接收外部服务选中的链接
    pub fn choose(&self, links: Vec<RemoteLink>) -> FileBatch {
        let accept = self.accept.read().clone();
        let mut batch = FileBatch::default();

        for link in links {
            if !accepted(&accept, &format_from_name(&link.name)) {
                debug!("过滤不支持的链接: {}", link.name);
                continue;
            }

            let upload: UploadHandle = Arc::new(
                RemoteUrlUpload::new(
                    link,
                    self.service.clone(),
                    self.endpoint.clone(),
                    Arc::clone(&self.transport),
                    &self.mimes,
                )
                .with_authorization(self.authorization.clone()),
            );
            batch.files.push(PickedFile::Ready(upload));
        }

        info!("{}: 选择了 {} 个链接", self.service, batch.len());

        self.events.trigger(batch.clone());
        batch
    }
}

/// 读取外部服务导出的链接列表（JSON 数组）
pub async fn load_links(path: impl AsRef<Path>) -> Result<Vec<RemoteLink>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("读取链接文件失败: {}", path.display()))?;

    let links: Vec<RemoteLink> = serde_json::from_str(&content)
        .with_context(|| format!("解析链接文件失败: {}", path.display()))?;

    debug!("从 {} 读取了 {} 个链接", path.display(), links.len());
    Ok(links)
}

impl Picker for RemoteLinkPicker {
    fn subscribe(&self, callback: BatchCallback) -> Subscription<FileBatch> {
        self.events.subscribe(callback)
    }

    fn set_accept(&self, formats: &[String]) {
        *self.accept.write() = Some(normalize_formats(formats));
    }
}
