//! 协议错误定义
//!
//! 编解码、签名和密钥错误都是本地的类型化结果；权威服务错误会中止签发。
//! 校验端对外只给出 Valid / Invalid，具体原因保留在 [`Rejection`] 中用于审计日志。

use crate::key::KeyId;
use crate::record::Nonce;
use std::time::Duration;
use thiserror::Error;

/// SecureCode 或记录文本的格式错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedCode {
    #[error("Code too short: {len} characters, need at least {min}")]
    TooShort { len: usize, min: usize },

    /// 长度前缀不是两位十进制数字
    #[error("Length prefix is not two decimal digits: {0:?}")]
    LengthPrefix(String),

    #[error("Length mismatch: expected {expected} characters, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Invalid item identifier: {0}")]
    Identifier(String),

    #[error("Price field is not 6 decimal digits: {0:?}")]
    Price(String),

    #[error("Expiry field is not 10 decimal digits: {0:?}")]
    Expiry(String),

    #[error("Nonce field is not 16 uppercase hex characters: {0:?}")]
    Nonce(String),

    #[error("Key id field is not 8 uppercase hex characters: {0:?}")]
    KeyId(String),
}

/// 构造 DiscountRecord 时的字段错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Item identifier must be 1-99 characters, got {0}")]
    IdentifierLength(usize),

    #[error("Price {0} exceeds 999999")]
    PriceOutOfRange(u32),

    #[error("Expiry timestamp {0} does not fit in 10 decimal digits")]
    ExpiryOutOfRange(i64),
}

/// 密钥加载与查找错误
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid key file: {0}")]
    InvalidKeyFile(String),

    #[error("Unknown key: key_id={0}")]
    UnknownKey(KeyId),

    #[error("Key already exists: key_id={0}")]
    AlreadyExists(KeyId),

    #[error("Key store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 密钥结果类型别名
pub type KeyResult<T> = Result<T, KeyError>;

/// nonce 权威服务错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// nonce 已存在，拒绝覆盖
    #[error("Duplicate nonce: {0}")]
    DuplicateNonce(Nonce),

    #[error("Authority unavailable: {0}")]
    Unavailable(String),

    #[error("Authority rejected request: {0}")]
    Rejected(String),

    #[error("Authority storage error: {0}")]
    Storage(String),

    #[error("Authority call timed out after {0:?}")]
    Timeout(Duration),
}

/// 权威服务结果类型别名
pub type AuthorityResult<T> = Result<T, AuthorityError>;

/// 签发流程错误
#[derive(Error, Debug)]
pub enum IssueError {
    #[error("Invalid discount record: {0}")]
    Record(#[from] RecordError),

    /// nonce 注册失败（权威服务不可达、超时或拒绝），此时尚未签名
    #[error("Nonce registration failed: {0}")]
    RegistrationFailure(#[source] AuthorityError),

    #[error("Batch quantity must be at least 1")]
    EmptyBatch,
}

/// 校验被拒绝的具体原因（仅用于内部审计）
#[derive(Error, Debug)]
pub enum Rejection {
    #[error("Malformed code: {0}")]
    Malformed(#[from] MalformedCode),

    #[error("Nonce not registered: {0}")]
    NonceNotFound(Nonce),

    #[error("Nonce expired: {0}")]
    NonceExpired(Nonce),

    #[error("Unknown key: key_id={0}")]
    UnknownKey(KeyId),

    #[error("Key lookup failed: {0}")]
    KeyStore(KeyError),

    #[error("Key lookup timed out after {0:?}")]
    KeyTimeout(Duration),

    #[error("Tag mismatch")]
    TagMismatch,

    #[error("Authority error: {0}")]
    Authority(#[from] AuthorityError),
}

impl From<KeyError> for Rejection {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::UnknownKey(key_id) => Rejection::UnknownKey(key_id),
            other => Rejection::KeyStore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_maps_to_dedicated_rejection() {
        let key_id: KeyId = "AAAAAAAA".parse().unwrap();
        let rejection = Rejection::from(KeyError::UnknownKey(key_id));
        assert!(matches!(rejection, Rejection::UnknownKey(id) if id == key_id));

        let rejection = Rejection::from(KeyError::InvalidKeyFile("short".into()));
        assert!(matches!(rejection, Rejection::KeyStore(_)));
    }

    #[test]
    fn test_error_messages() {
        let err = MalformedCode::LengthMismatch {
            expected: 94,
            actual: 93,
        };
        assert_eq!(
            err.to_string(),
            "Length mismatch: expected 94 characters, got 93"
        );

        let err = IssueError::RegistrationFailure(AuthorityError::Unavailable("refused".into()));
        assert!(err.to_string().contains("refused"));
    }
}
