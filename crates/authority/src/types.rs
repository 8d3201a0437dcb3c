//! 权威服务 HTTP 数据类型定义

use crate::error::AuthorityServiceError;
use securecode::{KeyId, Nonce, NonceStatus};
use serde::{Deserialize, Serialize};

/// `PUT /submit-nonce` 表单
///
/// 字段都按字符串接收，缺失或格式错误统一返回 400。
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SubmitNonceForm {
    #[serde(default)]
    pub nonce: String,

    /// 过期时间（Unix 时间戳）
    #[serde(default)]
    pub expires: String,

    #[serde(default, rename = "key-id")]
    pub key_id: String,
}

impl SubmitNonceForm {
    pub fn new(nonce: &Nonce, expires: i64, key_id: &KeyId) -> Self {
        Self {
            nonce: nonce.to_string(),
            expires: expires.to_string(),
            key_id: key_id.to_string(),
        }
    }

    /// 解析并校验表单字段
    pub fn parse(&self) -> Result<(Nonce, i64, KeyId), AuthorityServiceError> {
        let nonce = self
            .nonce
            .parse::<Nonce>()
            .map_err(|e| AuthorityServiceError::InvalidRequest(e.to_string()))?;
        let expires = self.expires.trim().parse::<i64>().map_err(|_| {
            AuthorityServiceError::InvalidRequest(format!("expires is not an integer: {:?}", self.expires))
        })?;
        let key_id = self
            .key_id
            .parse::<KeyId>()
            .map_err(|e| AuthorityServiceError::InvalidRequest(e.to_string()))?;
        Ok((nonce, expires, key_id))
    }
}

/// 注册成功响应
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitNonceResponse {
    pub nonce: String,
    pub expires: i64,
    pub key_id: String,
}

/// `GET /verify-nonce/{nonce}` 响应体
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyNonceResponse {
    pub nonce: String,
    /// `valid` / `not_found` / `expired`
    pub status: String,
}

impl VerifyNonceResponse {
    pub fn status(&self) -> NonceStatus {
        match self.status.as_str() {
            "valid" => NonceStatus::Valid,
            "expired" => NonceStatus::Expired,
            _ => NonceStatus::NotFound,
        }
    }
}

/// `DELETE /delete-nonce/{nonce}` 响应体
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteNonceResponse {
    pub removed: bool,
}
