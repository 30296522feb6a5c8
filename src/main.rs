use anyhow::Context;
use chunk_uploader::{
    config::AppConfig,
    logging,
    uploader::{format_bytes, load_links, Authorization, ChunkTransport, HttpTransport, Picker},
    ManagerEvent, UploadManager,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 分片上传工具
#[derive(Debug, Parser)]
#[command(name = "chunk-uploader", version, about = "按分片将本地文件上传到 HTTP 服务")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config/app.toml")]
    config: String,

    /// 上传地址（覆盖配置文件）
    #[arg(long)]
    url: Option<String>,

    /// Bearer token（覆盖配置文件）
    #[arg(long)]
    token: Option<String>,

    /// 分片大小 (MB)
    #[arg(long)]
    chunk_size_mb: Option<u64>,

    /// 允许的扩展名，逗号分隔
    #[arg(long, value_delimiter = ',')]
    accept: Option<Vec<String>>,

    /// 展开目录时跟随符号链接
    #[arg(long)]
    follow_symlinks: bool,

    /// 远程链接列表（JSON 数组），由服务端按 import_endpoint 导入
    #[arg(long)]
    links: Option<PathBuf>,

    /// 要上传的文件或目录
    #[arg(required_unless_present = "links")]
    paths: Vec<PathBuf>,
}

impl Cli {
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(url) = &self.url {
            config.uploader.url = url.clone();
        }
        if let Some(token) = &self.token {
            config.uploader.authorization = Some(Authorization::bearer(token.clone()));
        }
        if let Some(mb) = self.chunk_size_mb {
            config.uploader.chunk_size = mb * 1024 * 1024;
        }
        if let Some(accept) = &self.accept {
            config.uploader.accept = Some(accept.clone());
        }
        if self.follow_symlinks {
            config.uploader.follow_symlinks = true;
        }
        if config.uploader.debug {
            config.log.level = "debug".to_string();
        }
    }
}

fn log_manager_event(event: &ManagerEvent) {
    match event {
        ManagerEvent::Add { queued, rejected } => {
            info!("加入队列 {} 个文件，拒绝 {} 个", queued.len(), rejected.len());
            for upload in rejected {
                let reason = upload
                    .rejection()
                    .map(|r| r.as_str())
                    .unwrap_or_default();
                warn!("已拒绝: {} ({})", upload.name(), reason);
            }
        }
        ManagerEvent::UploadStart { upload } => {
            info!("开始上传: {} ({})", upload.name(), format_bytes(upload.size()));
        }
        ManagerEvent::UploadComplete { upload } => {
            info!("✓ 上传完成: {}", upload.name());
        }
        ManagerEvent::UploadError { upload, error } => {
            error!("✗ 上传失败: {}, 错误: {}", upload.name(), error);
        }
        ManagerEvent::Progress {
            loaded,
            total,
            value,
        } => {
            debug!(
                "总进度: {:.1}% ({}/{})",
                value * 100.0,
                format_bytes(*loaded),
                format_bytes(*total)
            );
        }
        ManagerEvent::Cancel => warn!("上传已取消"),
        _ => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config).await;
    cli.apply_to(&mut config);

    // 🔥 初始化日志系统（必须保持 _log_guard 存活）
    let _log_guard = logging::init_logging(&config.log);

    info!("Chunk Uploader v{} 启动中...", env!("CARGO_PKG_VERSION"));

    config.validate()?;

    let transport: Arc<dyn ChunkTransport> = Arc::new(
        HttpTransport::new(config.uploader.connect_timeout()).context("初始化上传客户端失败")?,
    );
    let mimes = Arc::new(config.uploader.mime_registry());
    let manager = UploadManager::new(
        config.uploader.manager_options(),
        Arc::clone(&transport),
        Arc::clone(&mimes),
    );

    let _events = manager.events().subscribe(log_manager_event);

    if !cli.paths.is_empty() {
        let picker = Arc::new(config.uploader.path_picker());
        manager.add_source(Arc::clone(&picker) as Arc<dyn Picker>);
        picker.pick(&cli.paths).await.context("读取待上传文件失败")?;
    }

    if let Some(links_path) = &cli.links {
        let picker = config
            .uploader
            .link_picker("links", transport, mimes)
            .map(Arc::new)
            .context("使用 --links 需要在配置中设置 import_endpoint")?;
        manager.add_source(Arc::clone(&picker) as Arc<dyn Picker>);

        let links = load_links(links_path).await?;
        picker.choose(links);
    }

    if manager.queue().is_empty() {
        warn!("没有可上传的文件");
        return Ok(());
    }

    // 🔥 Ctrl+C 取消整个队列
    let cancel_manager = manager.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("收到 Ctrl+C，正在取消上传...");
            cancel_manager.cancel();
        }
    });

    let result = manager.start().await;
    signal_task.abort();

    let summary = result.context("上传队列执行失败")?;
    info!(
        "上传结束: 成功 {} 个，失败 {} 个，共 {}",
        summary.completed,
        summary.canceled,
        format_bytes(summary.progress.total)
    );

    if summary.canceled > 0 {
        anyhow::bail!("{} 个文件未能上传", summary.canceled);
    }

    Ok(())
}
