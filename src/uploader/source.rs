// 上传数据源
//
// 上传流程只依赖 FileSource：名称、大小、声明的类型，以及按范围读取

use crate::error::UploadError;
use async_trait::async_trait;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// 可分段读取的文件
#[async_trait]
pub trait FileSource: Send + Sync + fmt::Debug {
    /// 文件名（含扩展名）
    fn name(&self) -> &str;

    /// 文件大小（字节）
    fn size(&self) -> u64;

    /// 文件声明的 MIME 类型
    fn mime_type(&self) -> Option<&str> {
        None
    }

    /// 读取指定字节范围
    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>, UploadError>;
}

/// 本地磁盘文件
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    size: u64,
    mime_type: Option<String>,
}

impl LocalFile {
    /// 打开本地文件（只读取元数据）
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;

        if metadata.is_dir() {
            return Err(UploadError::Io(format!("不是文件: {}", path.display())));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path,
            name,
            size: metadata.len(),
            mime_type: None,
        })
    }

    /// 指定声明的 MIME 类型
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileSource for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>, UploadError> {
        let mut file = File::open(&self.path).await?;

        file.seek(std::io::SeekFrom::Start(range.start)).await?;

        let len = range.end.saturating_sub(range.start) as usize;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer).await?;

        debug!(
            "读取分片数据: {:?}, bytes={}-{}, 大小={} bytes",
            self.path,
            range.start,
            range.end.saturating_sub(1),
            len
        );

        Ok(buffer)
    }
}

/// 内存中的文件
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    data: Arc<Vec<u8>>,
    mime_type: Option<String>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(data.into()),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[async_trait]
impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>, UploadError> {
        let start = range.start as usize;
        let end = range.end as usize;

        self.data
            .get(start..end)
            .map(|slice| slice.to_vec())
            .ok_or_else(|| {
                UploadError::Io(format!(
                    "读取范围越界: {}..{} (大小 {})",
                    start,
                    end,
                    self.data.len()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_local_file_read_range() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"0123456789abcdef").unwrap();
        temp_file.flush().unwrap();

        let file = LocalFile::open(temp_file.path()).await.unwrap();
        assert_eq!(file.size(), 16);
        assert!(file.mime_type().is_none());

        let data = file.read_range(4..10).await.unwrap();
        assert_eq!(data, b"456789");
    }

    #[tokio::test]
    async fn test_local_file_short_read_fails() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"short").unwrap();
        temp_file.flush().unwrap();

        let file = LocalFile::open(temp_file.path()).await.unwrap();
        let result = file.read_range(0..64).await;
        assert!(matches!(result, Err(UploadError::Io(_))));
    }

    #[tokio::test]
    async fn test_local_file_rejects_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(LocalFile::open(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_file() {
        let file = MemoryFile::new("a.png", b"hello world".to_vec()).with_mime_type("image/png");

        assert_eq!(file.name(), "a.png");
        assert_eq!(file.size(), 11);
        assert_eq!(file.mime_type(), Some("image/png"));
        assert_eq!(file.read_range(6..11).await.unwrap(), b"world");
        assert!(file.read_range(6..20).await.is_err());
    }
}
