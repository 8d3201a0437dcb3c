//! SecureCode - 防重放折扣码协议核心
//!
//! 本 crate 只包含协议本身，不依赖任何 HTTP 框架或数据库：
//! 1. `record`：定长折扣记录的序列化 / 反序列化
//! 2. `code`：SecureCode 文本（记录 + key_id + tag）的拼装与拆分
//! 3. `key`：36 字节密钥文件的加载、生成与按 key_id 查找
//! 4. `signer`：HMAC-SHA1 标签计算与常数时间校验
//! 5. `authority`：nonce 权威服务的抽象接口及内存实现
//! 6. `issuer` / `verifier`：签发与校验流程
//!
//! HTTP 服务端、SQLite 存储和 HTTP 客户端位于 `authority` crate。

pub mod authority;
pub mod code;
pub mod error;
pub mod issuer;
pub mod key;
pub mod record;
pub mod signer;
pub mod verifier;

pub use authority::{
    ConsumeOutcome, MemoryAuthority, NonceAuthority, NonceRecord, NonceStatus, unix_now,
};
pub use code::{CodeParts, SecureCode};
pub use error::{
    AuthorityError, AuthorityResult, IssueError, KeyError, KeyResult, MalformedCode, RecordError,
    Rejection,
};
pub use issuer::{Issuer, expiry_for_date};
pub use key::{
    FileKeyStore, KeyId, KeyStore, MemoryKeyStore, Secret, SigningKey, load_key, load_key_file,
};
pub use record::{DiscountRecord, Nonce};
pub use verifier::{Verdict, Verifier};

use std::time::Duration;

/// 权威服务往返和密钥读取的默认超时
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// 是否全部由 `0-9A-F` 组成
pub(crate) fn is_upper_hex(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

/// 是否全部由十进制数字组成
pub(crate) fn is_decimal(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// 在第 `n` 个字符处切分；字符数不足时返回 `None`
pub(crate) fn split_at_chars(s: &str, n: usize) -> Option<(&str, &str)> {
    match s.char_indices().nth(n) {
        Some((idx, _)) => Some(s.split_at(idx)),
        None if s.chars().count() == n => Some((s, "")),
        None => None,
    }
}
