//! 通用基础设施库
//!
//! 为折扣码服务提供统一的配置加载、校验与错误类型

pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use config::{
    AuthorityServiceConfig, ClientConfig, DiscountConfig, LogConfig, ObservabilityConfig, SweepPolicy,
};
pub use error::{ConfigError, ConfigResult};
