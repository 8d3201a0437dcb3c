//! discountd 主程序
//!
//! 无子命令时运行 nonce 权威服务；其余子命令是签发、校验和密钥管理工具。

mod cli;
mod commands;
mod error;
mod observability;
mod server;

use anyhow::Context;
use clap::Parser;
use discount_common::{ConfigError, DiscountConfig};
use observability::{init_command_logging, init_observability};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{error, info};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use commands::{Expiry, IssueRequest};
use error::{Error, Result};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Test { ref config_file }) => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            ApplicationLauncher::test_config_file(&config_path)?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;

            // Create Tokio runtime（before running the application）
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            // Run the asynchronous application
            runtime.block_on(ApplicationLauncher::run_application(&config_path))?;
            Ok(ExitCode::SUCCESS)
        }
        Some(command) => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;
            let config = ApplicationLauncher::load_config(&config_path)?;
            init_command_logging(&config);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(ApplicationLauncher::run_command(&config, command))
        }
    }
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        // If the provided path is not the default "config.toml", check if it exists
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                return Ok(provided_path.clone());
            } else {
                bootstrap_error!("Provided config file not found: {:?}", provided_path);
                return Err(Error::custom(format!(
                    "Config file not found: {provided_path:?}"
                )));
            }
        }

        // Otherwise, try fallback locations
        let fallback_paths = vec![
            // 1. Current working directory
            PathBuf::from("config.toml"),
            // 2. System config directory
            PathBuf::from("/etc/discountd/config.toml"),
        ];

        for path in &fallback_paths {
            if path.exists() {
                return Ok(path.clone());
            }
        }

        // If no config file found, provide helpful error message
        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: discountd --config <path>");

        Err(Error::custom(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 加载并校验配置，警告只打印不阻止
    fn load_config(config_path: &Path) -> Result<DiscountConfig> {
        let config = DiscountConfig::from_file(config_path).map_err(|e| {
            bootstrap_error!("❌ 配置加载失败: {}", e);
            e
        })?;

        if let Err(messages) = config.validate() {
            for (i, msg) in messages.iter().enumerate() {
                if msg.starts_with("Warning:") {
                    bootstrap_error!("  {}. ⚠️  {}", i + 1, msg);
                } else {
                    bootstrap_error!("  {}. ❌ {}", i + 1, msg);
                }
            }

            let critical: Vec<String> = messages
                .into_iter()
                .filter(|msg| !msg.starts_with("Warning:"))
                .collect();
            if !critical.is_empty() {
                return Err(ConfigError::Invalid(critical).into());
            }
        }

        Ok(config)
    }

    /// 测试配置文件是否有效（警告不影响结果）
    fn test_config_file(config_path: &Path) -> Result<()> {
        let config = Self::load_config(config_path)?;
        bootstrap_info!(
            "✅ 配置验证通过: {:?} (name={}, env={})",
            config_path,
            config.name,
            config.env
        );
        Ok(())
    }

    /// 运行权威服务的主入口
    async fn run_application(config_path: &Path) -> Result<()> {
        bootstrap_info!("📄 加载配置文件: {:?}", config_path);
        let config = Self::load_config(config_path)?;
        bootstrap_info!("✅ 配置加载成功");

        // ensure sqlite_path directory exists
        if !config.sqlite_path.exists() {
            std::fs::create_dir_all(&config.sqlite_path).with_context(|| {
                format!(
                    "Failed to create SQLite data directory: {}",
                    config.sqlite_path.display()
                )
            })?;
        }

        let _observability_guard = init_observability(&config)?;

        info!("🚀 启动折扣码 nonce 权威服务: {}", config.name);

        // 初始化全局关闭通道（HTTP 服务与清理任务共享）
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(10);
        setup_ctrl_c_handler(shutdown_tx.clone()).await;

        let server = server::start_authority_server(&config, shutdown_tx.clone()).await?;
        Self::display_service_info(&config, server.local_addr);

        for handle in server.handles {
            if let Err(e) = handle.await {
                error!("Service task terminated unexpectedly: {}", e);
                let _ = shutdown_tx.send(());
            }
        }

        info!("🛑 所有服务已安全关闭");
        Ok(())
    }

    async fn run_command(config: &DiscountConfig, command: Commands) -> Result<ExitCode> {
        match command {
            Commands::Keygen => {
                let key_id = commands::keygen(config).await?;
                println!("{key_id}");
                Ok(ExitCode::SUCCESS)
            }
            Commands::Issue {
                key_id,
                item,
                price,
                expires,
                date,
                quantity,
            } => {
                let expiry = match (expires, date) {
                    (Some(ts), _) => Expiry::Timestamp(ts),
                    (None, Some(date)) => Expiry::Date(date),
                    (None, None) => {
                        return Err(Error::custom("Either --expires or --date is required"));
                    }
                };
                let request = IssueRequest {
                    key_id,
                    item,
                    price,
                    expiry,
                    quantity,
                };
                for code in commands::issue(config, &request).await? {
                    println!("{code}");
                }
                Ok(ExitCode::SUCCESS)
            }
            Commands::Verify { code } => {
                Ok(Self::report_verdict(commands::verify(config, &code).await?))
            }
            Commands::Redeem { code } => {
                Ok(Self::report_verdict(commands::redeem(config, &code).await?))
            }
            Commands::Consume { nonce } => {
                let outcome = commands::consume(config, &nonce).await?;
                println!("{}", if outcome.removed() { "REMOVED" } else { "ALREADY_GONE" });
                Ok(ExitCode::SUCCESS)
            }
            Commands::Test { .. } => Err(Error::custom("test is handled before runtime startup")),
        }
    }

    fn report_verdict(verdict: securecode::Verdict) -> ExitCode {
        println!("{}", verdict.as_str());
        if verdict.is_valid() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    /// 显示服务信息
    fn display_service_info(config: &DiscountConfig, local_addr: std::net::SocketAddr) {
        info!("✅ 权威服务已启动 (env={})", config.env);
        info!("📡 HTTP 服务器监听在: http://{}", local_addr);
        info!("🔧 可用的API端点:");
        info!("  - PUT    http://{}/submit-nonce", local_addr);
        info!("  - GET    http://{}/verify-nonce/{{nonce}}", local_addr);
        info!("  - DELETE http://{}/delete-nonce/{{nonce}}", local_addr);
        info!("  - GET    http://{}/health", local_addr);
        info!("  - GET    http://{}/metrics", local_addr);
        info!("🧹 过期 nonce 清理策略: {}", config.authority.sweep.name());
    }
}

/// 设置Ctrl-C信号处理程序
async fn setup_ctrl_c_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听Ctrl-C信号: {}", e);
            return;
        }
        info!("收到Ctrl-C信号，开始优雅关闭...");
        let _ = shutdown_tx.send(());
    });
}
