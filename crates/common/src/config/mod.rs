//! 统一配置管理
//!
//! 折扣码服务所有配置项的定义、默认值与校验都在这里。

pub mod authority;
pub mod observability;

pub use crate::config::authority::{AuthorityServiceConfig, ClientConfig, SweepPolicy};
pub use crate::config::observability::{LogConfig, ObservabilityConfig};

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// 折扣码服务的主配置
///
/// 配置文件使用 TOML 格式，所有段都有默认值。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiscountConfig {
    /// 实例名称，用于日志中区分节点
    #[serde(default = "default_name")]
    pub name: String,

    /// 运行环境标识
    ///
    /// - "dev": 开发环境
    /// - "prod": 生产环境，启用额外检查
    /// - "test": 测试环境，用于自动化测试
    #[serde(default = "default_env")]
    pub env: String,

    /// SQLite 数据库目录
    ///
    /// nonce 记录存储在 `{sqlite_path}/discounts.db`。
    #[serde(
        default = "default_sqlite_path",
        serialize_with = "serialize_pathbuf",
        deserialize_with = "deserialize_pathbuf"
    )]
    pub sqlite_path: PathBuf,

    /// 密钥文件目录，每个密钥一个 `{KEYID}.key` 文件
    #[serde(
        default = "default_keys_dir",
        serialize_with = "serialize_pathbuf",
        deserialize_with = "deserialize_pathbuf"
    )]
    pub keys_dir: PathBuf,

    /// 权威服务端配置（绑定地址与清理策略）
    #[serde(default)]
    pub authority: AuthorityServiceConfig,

    /// 签发 / 校验命令访问权威服务时的客户端配置
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_name() -> String {
    "discountd".to_string()
}

fn default_env() -> String {
    "dev".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("database")
}

fn default_keys_dir() -> PathBuf {
    PathBuf::from("keys")
}

fn serialize_pathbuf<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    path.display().to_string().serialize(serializer)
}

fn deserialize_pathbuf<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(PathBuf::from(s))
}

impl Default for DiscountConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            env: default_env(),
            sqlite_path: default_sqlite_path(),
            keys_dir: default_keys_dir(),
            authority: AuthorityServiceConfig::default(),
            client: ClientConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl DiscountConfig {
    /// 检查是否使用控制台日志输出
    pub fn is_console_logging(&self) -> bool {
        self.observability.log.output == "console"
    }

    /// 检查是否应该轮转日志
    pub fn should_rotate_logs(&self) -> bool {
        self.observability.log.output == "file" && self.observability.log.rotate
    }

    /// 获取日志过滤级别，优先使用 RUST_LOG
    pub fn get_filter_level(&self) -> String {
        std::env::var("RUST_LOG")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.observability.filter_level.clone())
    }

    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::FileNotFound {
                path: path_ref.display().to_string(),
            });
        }

        if !path_ref.is_file() {
            return Err(ConfigError::NotAFile {
                path: path_ref.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path_ref)?;
        Self::from_toml(&content)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// 验证配置有效性
    ///
    /// 以 `Warning:` 开头的条目不阻止启动，其余为致命错误。
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Instance name cannot be empty".to_string());
        }

        if !["dev", "prod", "test"].contains(&self.env.as_str()) {
            errors.push(format!(
                "Invalid environment '{}', must be one of: dev, prod, test",
                self.env
            ));
        }

        // 过滤级别（EnvFilter 语法，只检查第一段）
        let main_level = self
            .observability
            .filter_level
            .split(',')
            .next()
            .unwrap_or("")
            .trim();
        if !["trace", "debug", "info", "warn", "error"].contains(&main_level) {
            errors.push(format!(
                "Invalid filter level '{}', must start with one of: trace, debug, info, warn, error",
                self.observability.filter_level
            ));
        }

        if !["console", "file"].contains(&self.observability.log.output.as_str()) {
            errors.push(format!(
                "Invalid log output '{}' (observability.log.output), must be 'console' or 'file'",
                self.observability.log.output
            ));
        }

        if self.sqlite_path.as_os_str().is_empty() {
            errors.push("SQLite database path cannot be empty".to_string());
        }

        if self.keys_dir.as_os_str().is_empty() {
            errors.push("Key directory (keys_dir) cannot be empty".to_string());
        }

        if self.authority.ip.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid authority.ip '{}', must be a valid IP address",
                self.authority.ip
            ));
        }

        if self.authority.port == 0 {
            errors.push(
                "Warning: authority.port = 0 binds an ephemeral port; clients cannot find it"
                    .to_string(),
            );
        }

        if let Err(e) = self.authority.sweep.validate() {
            errors.push(format!("Invalid authority sweep policy: {e}"));
        }

        if !self.client.endpoint.starts_with("http://")
            && !self.client.endpoint.starts_with("https://")
        {
            errors.push(format!(
                "Invalid client.endpoint '{}', must start with http:// or https://",
                self.client.endpoint
            ));
        }

        if self.client.timeout_seconds == 0 {
            errors.push("client.timeout_seconds must be greater than 0".to_string());
        }

        // 生产环境额外检查
        if self.env == "prod" {
            if self.observability.log.output == "console" {
                errors.push("Warning: Production environment should use file logging (observability.log.output = \"file\")".to_string());
            }

            if self.observability.log.output == "file" && !self.observability.log.rotate {
                errors.push("Warning: Production environment should enable log rotation (observability.log.rotate = true)".to_string());
            }

            if self.authority.sweep == SweepPolicy::Never {
                errors.push("Warning: authority.sweep.policy = \"never\" keeps expired nonces forever".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
