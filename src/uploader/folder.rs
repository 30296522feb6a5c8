//! 目录展开
//!
//! 选择器收到目录时，把目录展开成文件列表：
//! - 递归遍历子目录
//! - 可选跳过隐藏文件、按扩展名过滤
//! - 结果按相对路径排序，保证上传顺序稳定

use crate::uploader::mime::format_from_name;
use crate::uploader::progress::format_bytes;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// 扫描到的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// 文件路径
    pub path: PathBuf,
    /// 相对于扫描根目录的路径
    pub relative_path: PathBuf,
    pub size: u64,
    /// 小写扩展名
    pub format: String,
}

/// 扫描选项
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// 是否跟随符号链接
    pub follow_symlinks: bool,
    /// 跳过以 `.` 开头的文件和目录
    pub skip_hidden: bool,
    /// 最多返回的文件数
    pub max_files: Option<usize>,
    /// 允许的扩展名（小写，不含点），None 表示不过滤
    pub accept: Option<Vec<String>>,
}

/// 目录扫描器
#[derive(Debug, Clone, Default)]
pub struct FolderScanner {
    options: ScanOptions,
}

impl FolderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ScanOptions) -> Self {
        Self { options }
    }

    /// 扫描目录
    ///
    /// # 参数
    /// - `root`: 要展开的目录
    ///
    /// # 返回
    /// - 目录下的所有常规文件，按相对路径排序
    pub fn scan<P: AsRef<Path>>(&self, root: P) -> Result<Vec<ScannedFile>> {
        let root = root.as_ref();

        if !root.is_dir() {
            anyhow::bail!("不是目录: {}", root.display());
        }

        info!("展开目录: {}", root.display());

        let skip_hidden = self.options.skip_hidden;
        let walker = WalkDir::new(root)
            .follow_links(self.options.follow_symlinks)
            .into_iter()
            .filter_entry(move |entry| {
                entry.depth() == 0 || !(skip_hidden && is_hidden(entry))
            });

        let mut files = Vec::new();

        for entry in walker {
            // 单个条目出错（含符号链接成环）只跳过该条目
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("跳过无法访问的条目: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                if !entry.file_type().is_dir() {
                    debug!("跳过非常规文件: {}", entry.path().display());
                }
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let format = format_from_name(&name);
            if !self.accepts(&format) {
                debug!("跳过不支持的格式: {}", entry.path().display());
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("读取文件元数据失败: {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            let relative_path = entry
                .path()
                .strip_prefix(root)
                .with_context(|| format!("计算相对路径失败: {}", entry.path().display()))?
                .to_path_buf();

            files.push(ScannedFile {
                path: entry.into_path(),
                relative_path,
                size: metadata.len(),
                format,
            });
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        if let Some(max_files) = self.options.max_files {
            if files.len() > max_files {
                warn!("文件数超过上限 ({}), 只保留前 {} 个", files.len(), max_files);
                files.truncate(max_files);
            }
        }

        info!(
            "目录展开完成: {} 个文件，总大小 {}",
            files.len(),
            format_bytes(files.iter().map(|f| f.size).sum())
        );

        Ok(files)
    }

    fn accepts(&self, format: &str) -> bool {
        match &self.options.accept {
            Some(accept) => accept.iter().any(|a| a == format),
            None => true,
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}
