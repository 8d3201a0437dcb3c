//! 权威服务 HTTP 客户端
//!
//! [`HttpAuthority`] 通过 HTTP 访问远端权威服务，并实现 [`NonceAuthority`]，
//! 签发端和校验端可以像使用本地存储一样使用它。

use crate::error::{AuthorityServiceError, AuthorityServiceResult};
use crate::types::{DeleteNonceResponse, SubmitNonceForm, VerifyNonceResponse};
use async_trait::async_trait;
use discount_common::config::ClientConfig;
use reqwest::StatusCode;
use securecode::{
    AuthorityError, AuthorityResult, ConsumeOutcome, KeyId, Nonce, NonceAuthority, NonceStatus,
};
use std::time::Duration;
use tracing::debug;

/// 远端权威服务客户端
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpAuthority {
    pub fn new(config: &ClientConfig) -> AuthorityServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AuthorityServiceError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
            timeout: config.timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, e: reqwest::Error) -> AuthorityError {
        if e.is_timeout() {
            AuthorityError::Timeout(self.timeout)
        } else {
            AuthorityError::Unavailable(e.to_string())
        }
    }
}

async fn unexpected_status(response: reqwest::Response) -> AuthorityError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    AuthorityError::Rejected(format!("status {status}: {text}"))
}

#[async_trait]
impl NonceAuthority for HttpAuthority {
    async fn issue(&self, nonce: &Nonce, expiration: i64, key_id: &KeyId) -> AuthorityResult<()> {
        let url = format!("{}/submit-nonce", self.endpoint);
        debug!("Submitting nonce {} to {}", nonce, url);

        let response = self
            .client
            .put(&url)
            .form(&SubmitNonceForm::new(nonce, expiration, key_id))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => Err(AuthorityError::DuplicateNonce(*nonce)),
            _ => Err(unexpected_status(response).await),
        }
    }

    async fn verify(&self, nonce: &Nonce) -> AuthorityResult<NonceStatus> {
        let url = format!("{}/verify-nonce/{}", self.endpoint, nonce);
        debug!("Verifying nonce at {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::OK => Ok(NonceStatus::Valid),
            // 410 的响应体区分 expired / not_found，解析失败按不存在处理
            StatusCode::GONE => Ok(response
                .json::<VerifyNonceResponse>()
                .await
                .map(|body| body.status())
                .ok()
                .filter(|status| !status.is_live())
                .unwrap_or(NonceStatus::NotFound)),
            _ => Err(unexpected_status(response).await),
        }
    }

    async fn consume(&self, nonce: &Nonce) -> AuthorityResult<ConsumeOutcome> {
        let url = format!("{}/delete-nonce/{}", self.endpoint, nonce);
        debug!("Consuming nonce at {}", url);

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() != StatusCode::OK {
            return Err(unexpected_status(response).await);
        }

        let body: DeleteNonceResponse = response
            .json()
            .await
            .map_err(|e| AuthorityError::Rejected(format!("Malformed delete response: {e}")))?;
        Ok(ConsumeOutcome::from_removed(body.removed))
    }

    async fn purge_expired(&self, _now: i64) -> AuthorityResult<u64> {
        Err(AuthorityError::Rejected(
            "purge is not exposed over HTTP; configure the service sweep policy".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash() {
        let client = HttpAuthority::new(&ClientConfig {
            endpoint: "http://127.0.0.1:5000/".to_string(),
            timeout_seconds: 1,
        })
        .unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:5000");
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // 端口 1 上通常没有服务监听
        let client = HttpAuthority::new(&ClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            timeout_seconds: 2,
        })
        .unwrap();

        let result = client.verify(&Nonce::random()).await;
        assert!(matches!(
            result,
            Err(AuthorityError::Unavailable(_)) | Err(AuthorityError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_not_supported() {
        let client = HttpAuthority::new(&ClientConfig::default()).unwrap();
        assert!(matches!(
            client.purge_expired(0).await,
            Err(AuthorityError::Rejected(_))
        ));
    }
}
