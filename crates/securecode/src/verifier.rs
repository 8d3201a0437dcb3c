//! 折扣码校验流程
//!
//! 校验顺序：长度 → 拆分 → 反序列化 → nonce 状态 → 密钥 → 标签。
//! nonce 不处于有效状态时不读取任何密钥材料。

use crate::DEFAULT_CALL_TIMEOUT;
use crate::authority::{ConsumeOutcome, NonceAuthority, NonceStatus};
use crate::code;
use crate::error::{AuthorityError, Rejection};
use crate::key::{KeyId, KeyStore, SigningKey};
use crate::record::{DiscountRecord, Nonce};
use crate::signer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 对外的校验结论，具体原因只进日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid,
}

impl Verdict {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
        }
    }
}

/// 折扣码校验器
#[derive(Clone)]
pub struct Verifier {
    authority: Arc<dyn NonceAuthority>,
    keys: Arc<dyn KeyStore>,
    timeout: Duration,
}

impl Verifier {
    pub fn new(authority: Arc<dyn NonceAuthority>, keys: Arc<dyn KeyStore>) -> Self {
        Self {
            authority,
            keys,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// 设置权威服务往返和密钥读取的超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 完整校验并返回记录，失败时给出具体原因
    ///
    /// 不消费 nonce。
    pub async fn inspect(&self, text: &str) -> Result<DiscountRecord, Rejection> {
        let parts = code::split(text)?;
        let record = DiscountRecord::deserialize(parts.serialized_record)?;
        let key_id = parts.key_id()?;

        match self.nonce_status(record.nonce()).await? {
            NonceStatus::Valid => {}
            NonceStatus::NotFound => return Err(Rejection::NonceNotFound(*record.nonce())),
            NonceStatus::Expired => return Err(Rejection::NonceExpired(*record.nonce())),
        }

        let key = self.load_key(&key_id).await?;
        if !signer::verify(parts.serialized_record, key.secret(), parts.tag) {
            return Err(Rejection::TagMismatch);
        }

        Ok(record)
    }

    /// 校验折扣码，不消费 nonce
    pub async fn lookup_code(&self, text: &str) -> Verdict {
        match self.inspect(text).await {
            Ok(record) => {
                debug!(
                    "Code valid: item={} nonce={}",
                    record.item_identifier(),
                    record.nonce()
                );
                Verdict::Valid
            }
            Err(rejection) => {
                warn!("Code rejected: {}", rejection);
                Verdict::Invalid
            }
        }
    }

    /// 校验并消费
    ///
    /// 只有本次调用真正删除了 nonce 才返回 `Valid`，并发兑换同一码时恰有一个成功。
    pub async fn redeem(&self, text: &str) -> Verdict {
        let record = match self.inspect(text).await {
            Ok(record) => record,
            Err(rejection) => {
                warn!("Redeem rejected: {}", rejection);
                return Verdict::Invalid;
            }
        };

        match self.consume(record.nonce()).await {
            Ok(ConsumeOutcome::Removed) => {
                info!(
                    "Redeemed code: item={} price={} nonce={}",
                    record.item_identifier(),
                    record.new_price(),
                    record.nonce()
                );
                Verdict::Valid
            }
            Ok(ConsumeOutcome::AlreadyGone) => {
                warn!("Redeem lost race, nonce already consumed: {}", record.nonce());
                Verdict::Invalid
            }
            Err(e) => {
                warn!("Redeem failed to consume nonce {}: {}", record.nonce(), e);
                Verdict::Invalid
            }
        }
    }

    /// 直接消费 nonce，幂等
    pub async fn consume(&self, nonce: &Nonce) -> Result<ConsumeOutcome, AuthorityError> {
        tokio::time::timeout(self.timeout, self.authority.consume(nonce))
            .await
            .unwrap_or(Err(AuthorityError::Timeout(self.timeout)))
    }

    async fn nonce_status(&self, nonce: &Nonce) -> Result<NonceStatus, AuthorityError> {
        tokio::time::timeout(self.timeout, self.authority.verify(nonce))
            .await
            .unwrap_or(Err(AuthorityError::Timeout(self.timeout)))
    }

    async fn load_key(&self, key_id: &KeyId) -> Result<SigningKey, Rejection> {
        match tokio::time::timeout(self.timeout, self.keys.get_key(key_id)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Rejection::KeyTimeout(self.timeout)),
        }
    }
}
