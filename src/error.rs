//! 统一错误处理模型
//!
//! 提供 discountd 的顶层错误类型，聚合各 crate 的错误

use thiserror::Error;

/// 主应用的统一错误枚举
#[derive(Debug, Error)]
pub enum Error {
    // ========== 配置相关错误 ==========
    /// 配置文件加载或解析错误
    #[error("Configuration error: {0}")]
    Config(#[from] discount_common::ConfigError),

    // ========== 服务相关错误 ==========
    /// 权威服务错误
    #[error("Authority service error: {0}")]
    Authority(#[from] authority::AuthorityServiceError),

    /// 密钥加载或写入错误
    #[error("Key error: {0}")]
    Key(#[from] securecode::KeyError),

    /// 签发失败
    #[error("Issue failed: {0}")]
    Issue(#[from] securecode::IssueError),

    /// nonce 权威服务调用失败
    #[error("Nonce authority error: {0}")]
    NonceAuthority(#[from] securecode::AuthorityError),

    // ========== 系统级错误 ==========
    /// I/O 操作错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========== 业务逻辑错误 ==========
    /// 服务启动失败
    #[error("Service startup failed: {message}")]
    ServiceStartup { message: String },

    // ========== 通用错误 ==========
    /// Anyhow 错误兼容层
    #[error("Legacy error: {0}")]
    Anyhow(#[from] anyhow::Error),

    /// 自定义错误消息
    #[error("Application error: {message}")]
    Custom { message: String },
}

/// 统一的 Result 类型
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 创建自定义错误
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }

    /// 创建服务启动失败错误
    pub fn service_startup(message: impl Into<String>) -> Self {
        Self::ServiceStartup {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::custom("test error");
        assert!(matches!(err, Error::Custom { .. }));

        let err = Error::service_startup("port in use");
        assert_eq!(err.to_string(), "Service startup failed: port in use");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = securecode::IssueError::EmptyBatch.into();
        assert!(matches!(err, Error::Issue(_)));

        let err: Error = discount_common::ConfigError::Invalid(vec!["bad env".into()]).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: bad env"
        );
    }
}
