//! 一次性 CLI 命令
//!
//! 签发与校验命令通过 [`HttpAuthority`] 访问配置的权威服务，
//! 密钥从 `keys_dir` 读取。

use crate::error::{Error, Result};
use authority::HttpAuthority;
use chrono::NaiveDate;
use discount_common::DiscountConfig;
use securecode::{
    ConsumeOutcome, FileKeyStore, Issuer, KeyId, KeyStore, Nonce, NonceAuthority, SecureCode,
    Verdict, Verifier, expiry_for_date,
};
use std::sync::Arc;
use tracing::info;

/// 签发参数
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub key_id: KeyId,
    pub item: String,
    pub price: u32,
    pub expiry: Expiry,
    pub quantity: usize,
}

/// 过期时间：显式时间戳，或按日期换算为次日 06:00
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Timestamp(i64),
    Date(NaiveDate),
}

impl Expiry {
    pub fn resolve(self) -> Result<i64> {
        match self {
            Expiry::Timestamp(ts) => Ok(ts),
            Expiry::Date(date) => expiry_for_date(date)
                .ok_or_else(|| Error::custom(format!("No valid expiry for date {date}"))),
        }
    }
}

fn http_authority(config: &DiscountConfig) -> Result<Arc<dyn NonceAuthority>> {
    Ok(Arc::new(HttpAuthority::new(&config.client)?))
}

fn verifier(config: &DiscountConfig) -> Result<Verifier> {
    let keys = Arc::new(FileKeyStore::new(&config.keys_dir));
    Ok(Verifier::new(http_authority(config)?, keys).with_timeout(config.client.timeout()))
}

/// 在 `keys_dir` 下生成新密钥文件
pub async fn keygen(config: &DiscountConfig) -> Result<KeyId> {
    let store = FileKeyStore::new(&config.keys_dir);
    let key = store.generate().await?;
    info!(
        "Generated key {} at {}",
        key.key_id(),
        store.key_path(key.key_id()).display()
    );
    Ok(*key.key_id())
}

/// 签发一批折扣码
pub async fn issue(config: &DiscountConfig, request: &IssueRequest) -> Result<Vec<SecureCode>> {
    let valid_until = request.expiry.resolve()?;
    let key = FileKeyStore::new(&config.keys_dir)
        .get_key(&request.key_id)
        .await?;

    let issuer = Issuer::new(http_authority(config)?).with_timeout(config.client.timeout());
    let codes = issuer
        .generate_batch(
            &request.item,
            request.price,
            valid_until,
            &key,
            request.quantity,
        )
        .await?;
    Ok(codes)
}

/// 查询折扣码是否有效，不消费 nonce
pub async fn verify(config: &DiscountConfig, code: &str) -> Result<Verdict> {
    Ok(verifier(config)?.lookup_code(code).await)
}

/// 校验并消费折扣码
pub async fn redeem(config: &DiscountConfig, code: &str) -> Result<Verdict> {
    Ok(verifier(config)?.redeem(code).await)
}

/// 直接消费 nonce
pub async fn consume(config: &DiscountConfig, nonce: &Nonce) -> Result<ConsumeOutcome> {
    Ok(verifier(config)?.consume(nonce).await?)
}
