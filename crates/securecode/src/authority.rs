//! nonce 权威服务抽象
//!
//! 每个 nonce 的状态机：`Unregistered → issue → Active → consume → Consumed`。
//! `Expired` 是 Active 在 `now > expiration` 时的派生状态，不落存储。
//!
//! `issue` 与 `consume` 必须按 nonce 线性化，保证两个并发的校验+消费序列
//! 只有一个能真正删除记录。

use crate::error::{AuthorityError, AuthorityResult};
use crate::key::KeyId;
use crate::record::Nonce;
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tokio::sync::RwLock;
use tracing::debug;

/// 当前 Unix 时间戳（秒）
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `verify` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStatus {
    Valid,
    NotFound,
    Expired,
}

impl NonceStatus {
    /// 根据过期时间推导状态，`now == expiration` 仍然有效
    pub fn at(expiration: i64, now: i64) -> Self {
        if now > expiration {
            Self::Expired
        } else {
            Self::Valid
        }
    }

    pub fn is_live(self) -> bool {
        self == Self::Valid
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::NotFound => "not_found",
            Self::Expired => "expired",
        }
    }
}

/// `consume` 的结果，两种情况都不是错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// 本次调用删除了记录
    Removed,
    /// 记录不存在（从未注册或已被消费）
    AlreadyGone,
}

impl ConsumeOutcome {
    pub fn from_removed(removed: bool) -> Self {
        if removed { Self::Removed } else { Self::AlreadyGone }
    }

    pub fn removed(self) -> bool {
        self == Self::Removed
    }
}

/// 权威服务侧的 nonce 记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceRecord {
    pub nonce: Nonce,
    pub expiration: i64,
    pub key_id: KeyId,
}

/// nonce 权威服务接口
///
/// 内存、SQLite 和 HTTP 客户端实现都通过此 trait 注入签发 / 校验流程。
#[async_trait]
pub trait NonceAuthority: Send + Sync {
    /// 注册新 nonce，已存在时返回 [`AuthorityError::DuplicateNonce`]，不覆盖
    async fn issue(&self, nonce: &Nonce, expiration: i64, key_id: &KeyId) -> AuthorityResult<()>;

    /// 只读查询 nonce 状态
    async fn verify(&self, nonce: &Nonce) -> AuthorityResult<NonceStatus>;

    /// 删除 nonce，幂等
    async fn consume(&self, nonce: &Nonce) -> AuthorityResult<ConsumeOutcome>;

    /// 删除所有 `expiration < now` 的记录，返回删除数量
    ///
    /// 只由显式配置的清理策略调用。
    async fn purge_expired(&self, now: i64) -> AuthorityResult<u64>;
}

/// 内存 nonce 权威服务
#[derive(Debug, Default)]
pub struct MemoryAuthority {
    records: RwLock<HashMap<Nonce, NonceRecord>>,
}

impl MemoryAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, nonce: &Nonce) -> Option<NonceRecord> {
        self.records.read().await.get(nonce).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl NonceAuthority for MemoryAuthority {
    async fn issue(&self, nonce: &Nonce, expiration: i64, key_id: &KeyId) -> AuthorityResult<()> {
        match self.records.write().await.entry(*nonce) {
            Entry::Occupied(_) => Err(AuthorityError::DuplicateNonce(*nonce)),
            Entry::Vacant(slot) => {
                slot.insert(NonceRecord {
                    nonce: *nonce,
                    expiration,
                    key_id: *key_id,
                });
                debug!("Registered nonce {} (expires {})", nonce, expiration);
                Ok(())
            }
        }
    }

    async fn verify(&self, nonce: &Nonce) -> AuthorityResult<NonceStatus> {
        let status = match self.records.read().await.get(nonce) {
            Some(record) => NonceStatus::at(record.expiration, unix_now()),
            None => NonceStatus::NotFound,
        };
        Ok(status)
    }

    async fn consume(&self, nonce: &Nonce) -> AuthorityResult<ConsumeOutcome> {
        let removed = self.records.write().await.remove(nonce).is_some();
        Ok(ConsumeOutcome::from_removed(removed))
    }

    async fn purge_expired(&self, now: i64) -> AuthorityResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.expiration >= now);
        Ok((before - records.len()) as u64)
    }
}
