// 内容类型注册表
//
// - 扩展名 -> MIME 类型：文件自身未声明类型时，用于解析 Content-Type。
//   注册的映射优先，未注册的扩展名交给 mime_guess
// - 扩展名 -> 媒体大类（image/video/...）：用于远程导入时推导类型

use parking_lot::RwLock;
use std::collections::HashMap;

/// 兜底内容类型
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 内置覆盖项，mime_guess 缺失或给出旧式类型的扩展名
const DEFAULT_MIMES: &[(&str, &str)] = &[
    ("usdz", "model/vnd.usd+zip"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
];

const MEDIA_KINDS: &[(&str, &str)] = &[
    ("aac", "audio"),
    ("aiff", "audio"),
    ("flac", "audio"),
    ("m4a", "audio"),
    ("mp3", "audio"),
    ("oga", "audio"),
    ("opus", "audio"),
    ("wav", "audio"),
    ("wma", "audio"),
    ("bmp", "image"),
    ("cr2", "image"),
    ("jpg", "image"),
    ("jpeg", "image"),
    ("gif", "image"),
    ("ico", "image"),
    ("png", "image"),
    ("psd", "image"),
    ("svg", "image"),
    ("tif", "image"),
    ("tiff", "image"),
    ("usdz", "model"),
    ("avi", "video"),
    ("f4v", "video"),
    ("flv", "video"),
    ("mkv", "video"),
    ("mv4", "video"),
    ("mpg", "video"),
    ("mpeg", "video"),
    ("mov", "video"),
    ("mp4", "video"),
    ("ogg", "video"),
    ("ogv", "video"),
    ("qt", "video"),
    ("webm", "video"),
    ("wmv", "video"),
    ("eof", "font"),
    ("woff", "font"),
    ("woff2", "font"),
    ("ai", "application"),
    ("pdf", "application"),
];

/// 从文件名提取格式（最后一个点之后的部分，小写）
///
/// 没有扩展名时返回整个名称的小写形式
pub fn format_from_name(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_lowercase()
}

/// 扩展名注册表
///
/// 通过构造注入到上传流程中，不使用全局可变状态
#[derive(Debug)]
pub struct MimeRegistry {
    mimes: RwLock<HashMap<String, String>>,
    kinds: HashMap<String, String>,
}

impl Default for MimeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeRegistry {
    /// 创建带内置表的注册表
    pub fn new() -> Self {
        let registry = Self::empty();
        for (ext, mime) in DEFAULT_MIMES {
            registry.register(ext, mime);
        }
        registry
    }

    /// 创建不含内置覆盖项的注册表
    pub fn empty() -> Self {
        Self {
            mimes: RwLock::new(HashMap::new()),
            kinds: MEDIA_KINDS
                .iter()
                .map(|(ext, kind)| (ext.to_string(), kind.to_string()))
                .collect(),
        }
    }

    /// 注册（或覆盖）扩展名对应的 MIME 类型
    pub fn register(&self, extension: &str, mime_type: &str) {
        let extension = extension.trim_start_matches('.').to_lowercase();
        self.mimes.write().insert(extension, mime_type.to_string());
    }

    /// 按扩展名查找 MIME 类型：先查注册表，再查 mime_guess
    pub fn resolve(&self, extension: &str) -> Option<String> {
        let extension = extension.trim_start_matches('.').to_lowercase();
        if let Some(mime_type) = self.mimes.read().get(&extension) {
            return Some(mime_type.clone());
        }

        mime_guess::from_ext(&extension)
            .first()
            .map(|mime| mime.essence_str().to_string())
    }

    /// 扩展名对应的媒体大类
    pub fn media_kind(&self, extension: &str) -> Option<&str> {
        self.kinds
            .get(&extension.to_lowercase())
            .map(|s| s.as_str())
    }

    /// 解析请求的 Content-Type
    ///
    /// 优先使用文件声明的类型，其次按扩展名查表，最后兜底
    pub fn content_type_for(&self, declared: Option<&str>, file_name: &str) -> String {
        if let Some(declared) = declared.filter(|t| !t.trim().is_empty()) {
            return declared.replace("//", "/");
        }

        self.resolve(&format_from_name(file_name))
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
    }
}
