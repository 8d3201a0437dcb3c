//! Nonce Authority 服务与客户端配置
//!
//! 对应配置文件中的 `[authority]`（服务端）与 `[client]`（签发 / 校验命令）段。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 权威服务默认端口
pub const DEFAULT_PORT: u16 = 5000;

/// 惰性清理默认间隔（请求数）
pub const DEFAULT_SWEEP_EVERY_REQUESTS: u32 = 100;

/// 权威服务端配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuthorityServiceConfig {
    /// 绑定 IP 地址
    #[serde(default = "default_ip")]
    pub ip: String,

    /// 绑定端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 过期 nonce 清理策略
    ///
    /// 默认 `never`：过期但未消费的记录一直保留，只是不再被判定为有效。
    #[serde(default)]
    pub sweep: SweepPolicy,
}

impl AuthorityServiceConfig {
    /// 绑定地址，形如 `127.0.0.1:5000`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl Default for AuthorityServiceConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
            sweep: SweepPolicy::default(),
        }
    }
}

/// 过期 nonce 清理策略
///
/// TOML 示例：
/// ```toml
/// [authority.sweep]
/// policy = "lazy"
/// every_requests = 100
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum SweepPolicy {
    /// 从不清理
    #[default]
    Never,

    /// 每 N 次请求在后台清理一次
    Lazy {
        #[serde(default = "default_sweep_every_requests")]
        every_requests: u32,
    },

    /// 固定间隔后台清理
    Interval { seconds: u64 },
}

impl SweepPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            SweepPolicy::Never => "never",
            SweepPolicy::Lazy { .. } => "lazy",
            SweepPolicy::Interval { .. } => "interval",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            SweepPolicy::Lazy { every_requests: 0 } => {
                Err("sweep.every_requests must be greater than 0".to_string())
            }
            SweepPolicy::Interval { seconds: 0 } => {
                Err("sweep.seconds must be greater than 0".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// 权威服务客户端配置
///
/// 签发 / 校验端通过 HTTP 连接远端权威服务时使用。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClientConfig {
    /// 权威服务地址，例如 "http://127.0.0.1:5000"
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// 单次请求超时（秒）
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_sweep_every_requests() -> u32 {
    DEFAULT_SWEEP_EVERY_REQUESTS
}

fn default_endpoint() -> String {
    format!("http://127.0.0.1:{DEFAULT_PORT}")
}

fn default_timeout_seconds() -> u64 {
    10
}
