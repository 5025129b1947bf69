use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use txsync_lib::commands::{self, SyncOptions};
use txsync_lib::logging::{LogConfig, SizeRotatingWriter};
use txsync_lib::{Direction, Workspace};

/// tx - 同步本地目录与腾讯云 COS
#[derive(Parser)]
#[command(name = "tx", version = env!("CARGO_PKG_VERSION"), about = "同步本地文件到 TencentCOS")]
struct Cli {
    /// 同步根目录（默认为当前目录）
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// 同时把日志输出到终端
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化 TencentCOS 配置
    Init,
    /// 展示所有的配置信息
    List,
    /// 配置 COS
    Config {
        /// 配置项名称，如 SecretId
        name: String,
        /// 配置项的值
        value: String,
    },
    /// 同步本地文件到 TencentCOS
    Sync {
        /// 只列出需要上传的文件
        #[arg(long)]
        dry_run: bool,
    },
    /// 拉取 TencentCOS 到本地
    SyncRemote {
        /// 跳过确认
        #[arg(short, long)]
        yes: bool,
        /// 只列出需要下载的文件
        #[arg(long)]
        dry_run: bool,
    },
}

/// 初始化日志系统
fn init_logging(workspace: &Workspace, verbose: bool) {
    let config = workspace
        .read_config()
        .map(|c| LogConfig::from_config(&c))
        .unwrap_or_default();

    // RUST_LOG 优先于配置文件
    let mut env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.tracing_level().into())
        .from_env_lossy();
    for directive in ["opendal=warn", "hyper=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    // 未初始化的目录不创建 .tx/logs
    let file_layer = (config.enabled && workspace.is_initialized())
        .then(|| SizeRotatingWriter::new(&workspace.log_dir(), config.max_size_mb).ok())
        .flatten()
        .map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
        });

    let console_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let workspace = Workspace::new(root);

    init_logging(&workspace, cli.verbose);

    match cli.command {
        Commands::Init => commands::init_workspace(&workspace),
        Commands::List => commands::list_config(&workspace),
        Commands::Config { name, value } => commands::set_config(&workspace, &name, &value),
        Commands::Sync { dry_run } => {
            commands::sync(
                &workspace,
                Direction::Upload,
                SyncOptions { dry_run, yes: false },
            )
            .await
        }
        Commands::SyncRemote { yes, dry_run } => {
            commands::sync(&workspace, Direction::Download, SyncOptions { dry_run, yes }).await
        }
    }
}
