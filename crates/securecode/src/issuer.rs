//! 折扣码签发流程
//!
//! 先向权威服务注册 nonce，成功后才签名；注册失败时不产生任何码。

use crate::DEFAULT_CALL_TIMEOUT;
use crate::authority::NonceAuthority;
use crate::code::SecureCode;
use crate::error::{AuthorityError, IssueError};
use crate::key::SigningKey;
use crate::record::{DiscountRecord, Nonce};
use crate::signer;
use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 折扣码签发器
#[derive(Clone)]
pub struct Issuer {
    authority: Arc<dyn NonceAuthority>,
    timeout: Duration,
}

impl Issuer {
    pub fn new(authority: Arc<dyn NonceAuthority>) -> Self {
        Self {
            authority,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// 设置权威服务调用超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 签发单个折扣码
    ///
    /// # 流程
    /// 1. 生成随机 nonce 并构造记录
    /// 2. 在权威服务注册 nonce（超时视为注册失败）
    /// 3. 序列化、签名并拼装 SecureCode
    pub async fn generate_discount(
        &self,
        item_identifier: &str,
        new_price: u32,
        valid_until: i64,
        key: &SigningKey,
    ) -> Result<SecureCode, IssueError> {
        let record = DiscountRecord::new(item_identifier, new_price, valid_until, Nonce::random())?;

        self.register(&record, key).await?;

        let serialized = record.serialize();
        let tag = signer::sign(&serialized, key.secret());
        debug!(
            "Issued code for item {} with nonce {}",
            record.item_identifier(),
            record.nonce()
        );
        Ok(SecureCode::assemble(&serialized, key.key_id(), &tag))
    }

    /// 批量签发：相同商品、价格和过期时间，nonce 各不相同
    ///
    /// 任一单元失败即中止整个批次，已注册的 nonce 留待自然过期。
    pub async fn generate_batch(
        &self,
        item_identifier: &str,
        new_price: u32,
        valid_until: i64,
        key: &SigningKey,
        quantity: usize,
    ) -> Result<Vec<SecureCode>, IssueError> {
        if quantity == 0 {
            return Err(IssueError::EmptyBatch);
        }

        let mut codes = Vec::with_capacity(quantity);
        for _ in 0..quantity {
            let code = self
                .generate_discount(item_identifier, new_price, valid_until, key)
                .await
                .inspect_err(|e| {
                    warn!(
                        "Batch aborted after {} of {} codes: {}",
                        codes.len(),
                        quantity,
                        e
                    )
                })?;
            codes.push(code);
        }

        info!(
            "Issued {} codes for item {} (key_id={})",
            quantity,
            item_identifier,
            key.key_id()
        );
        Ok(codes)
    }

    async fn register(&self, record: &DiscountRecord, key: &SigningKey) -> Result<(), IssueError> {
        let result = tokio::time::timeout(
            self.timeout,
            self.authority
                .issue(record.nonce(), record.valid_until(), key.key_id()),
        )
        .await
        .unwrap_or(Err(AuthorityError::Timeout(self.timeout)));

        result.map_err(|e| {
            warn!("Nonce registration failed for {}: {}", record.nonce(), e);
            IssueError::RegistrationFailure(e)
        })
    }
}

/// 常规折扣过期时间：所选日期次日本地时间 06:00
///
/// 日期溢出或该本地时间不存在时返回 `None`。
pub fn expiry_for_date(date: NaiveDate) -> Option<i64> {
    let next_day = date.succ_opt()?;
    let six_am = NaiveTime::from_hms_opt(6, 0, 0)?;
    Local
        .from_local_datetime(&next_day.and_time(six_am))
        .earliest()
        .map(|dt| dt.timestamp())
}
