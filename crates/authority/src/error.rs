//! Nonce Authority 服务错误定义

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use securecode::{AuthorityError, Nonce};
use serde_json::json;
use thiserror::Error;

/// 权威服务错误类型
#[derive(Error, Debug)]
pub enum AuthorityServiceError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 无效的请求参数
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// nonce 已注册
    #[error("Duplicate nonce: {0}")]
    DuplicateNonce(Nonce),

    /// 内部服务器错误
    #[error("Internal server error: {0}")]
    Internal(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AuthorityError> for AuthorityServiceError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::DuplicateNonce(nonce) => AuthorityServiceError::DuplicateNonce(nonce),
            other => AuthorityServiceError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AuthorityServiceError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AuthorityServiceError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                "Invalid request parameters".to_string(),
            ),
            AuthorityServiceError::DuplicateNonce(_) => {
                (StatusCode::CONFLICT, "Nonce already registered".to_string())
            }
            _ => {
                // 不向客户端暴露内部错误详情
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// 权威服务结果类型别名
pub type AuthorityServiceResult<T> = Result<T, AuthorityServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let nonce: Nonce = "0011223344556677".parse().unwrap();
        let cases = [
            (
                AuthorityServiceError::InvalidRequest("bad expires".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AuthorityServiceError::DuplicateNonce(nonce),
                StatusCode::CONFLICT,
            ),
            (
                AuthorityServiceError::Internal("disk full".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_duplicate_maps_from_protocol_error() {
        let nonce: Nonce = "0011223344556677".parse().unwrap();
        let err = AuthorityServiceError::from(AuthorityError::DuplicateNonce(nonce));
        assert!(matches!(err, AuthorityServiceError::DuplicateNonce(n) if n == nonce));

        let err = AuthorityServiceError::from(AuthorityError::Storage("locked".into()));
        assert!(matches!(err, AuthorityServiceError::Internal(_)));
    }
}
