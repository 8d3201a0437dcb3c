//! 权威服务 HTTP 处理器
//!
//! 路由：
//! - `PUT /submit-nonce`：表单 `nonce` / `expires` / `key-id`，200 成功，409 重复，400 字段错误
//! - `GET /verify-nonce/{nonce}`：200 有效，410 不存在或已过期
//! - `DELETE /delete-nonce/{nonce}`：200，`{"removed": bool}`，幂等
//! - `GET /health`、`GET /metrics`

use crate::{
    error::{AuthorityServiceError, AuthorityServiceResult},
    metrics::{
        NONCE_VERIFICATIONS, NONCES_CONSUMED, NONCES_ISSUED, RequestTimer, export_metrics,
        register_metrics,
    },
    sqlite::SqliteAuthority,
    sweep::sweep_once,
    types::{DeleteNonceResponse, SubmitNonceForm, SubmitNonceResponse, VerifyNonceResponse},
};
use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, put},
};
use discount_common::config::{AuthorityServiceConfig, SweepPolicy};
use securecode::{AuthorityError, Nonce, NonceAuthority, NonceStatus};
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};
use tracing::{debug, info, warn};

/// 权威服务状态
#[derive(Clone)]
pub struct AuthorityState {
    pub authority: Arc<dyn NonceAuthority>,
    sweep: SweepPolicy,
    /// 请求计数器（用于惰性清理触发）
    request_counter: Arc<AtomicU32>,
}

impl AuthorityState {
    pub fn new(authority: Arc<dyn NonceAuthority>, sweep: SweepPolicy) -> Self {
        Self {
            authority,
            sweep,
            request_counter: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn sweep_policy(&self) -> SweepPolicy {
        self.sweep
    }

    /// 惰性清理：`lazy` 策略下每 N 次请求在后台清理一次
    fn maybe_sweep_expired(&self) {
        let SweepPolicy::Lazy { every_requests } = self.sweep else {
            return;
        };

        let count = self.request_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if every_requests == 0 || count % every_requests != 0 {
            return;
        }

        // 在后台异步清理，不阻塞当前请求
        let authority = self.authority.clone();
        tokio::spawn(async move {
            sweep_once(authority.as_ref()).await;
        });
    }
}

/// 从配置创建 AuthorityState，使用 `{sqlite_path}/discounts.db`
pub async fn create_authority_state(
    config: &AuthorityServiceConfig,
    sqlite_path: &std::path::Path,
) -> AuthorityServiceResult<AuthorityState> {
    info!("Initializing authority state (sweep policy: {})", config.sweep.name());

    config
        .sweep
        .validate()
        .map_err(AuthorityServiceError::Config)?;

    if let Err(e) = register_metrics() {
        warn!("Metrics registration warning (may already be registered): {}", e);
    }

    let authority = SqliteAuthority::new(sqlite_path).await?;
    Ok(AuthorityState::new(Arc::new(authority), config.sweep))
}

/// 创建权威服务路由
pub fn create_router(state: AuthorityState) -> Router {
    Router::new()
        .route("/submit-nonce", put(submit_nonce_handler))
        .route("/verify-nonce/{nonce}", get(verify_nonce_handler))
        .route("/delete-nonce/{nonce}", delete(delete_nonce_handler))
        .route("/health", get(health_check_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn submit_nonce_handler(
    State(app_state): State<AuthorityState>,
    Form(form): Form<SubmitNonceForm>,
) -> AuthorityServiceResult<Json<SubmitNonceResponse>> {
    let timer = RequestTimer::new("PUT", "/submit-nonce");
    app_state.maybe_sweep_expired();

    let (nonce, expires, key_id) = match form.parse() {
        Ok(fields) => fields,
        Err(e) => {
            debug!("Rejected nonce submission: {}", e);
            NONCES_ISSUED.with_label_values(&["invalid"]).inc();
            timer.observe(400);
            return Err(e);
        }
    };

    match app_state.authority.issue(&nonce, expires, &key_id).await {
        Ok(()) => {
            NONCES_ISSUED.with_label_values(&["created"]).inc();
            timer.observe(200);
            info!("Registered nonce {} (expires {}, key_id {})", nonce, expires, key_id);
            Ok(Json(SubmitNonceResponse {
                nonce: nonce.to_string(),
                expires,
                key_id: key_id.to_string(),
            }))
        }
        Err(AuthorityError::DuplicateNonce(nonce)) => {
            warn!("Duplicate nonce submission: {}", nonce);
            NONCES_ISSUED.with_label_values(&["duplicate"]).inc();
            timer.observe(409);
            Err(AuthorityServiceError::DuplicateNonce(nonce))
        }
        Err(e) => {
            NONCES_ISSUED.with_label_values(&["error"]).inc();
            timer.observe(500);
            Err(e.into())
        }
    }
}

async fn verify_nonce_handler(
    State(app_state): State<AuthorityState>,
    Path(nonce): Path<String>,
) -> AuthorityServiceResult<Response> {
    let timer = RequestTimer::new("GET", "/verify-nonce");
    app_state.maybe_sweep_expired();

    // 无法解析的 nonce 不可能被注册过
    let status = match nonce.parse::<Nonce>() {
        Ok(parsed) => match app_state.authority.verify(&parsed).await {
            Ok(status) => status,
            Err(e) => {
                timer.observe(500);
                return Err(e.into());
            }
        },
        Err(_) => NonceStatus::NotFound,
    };

    NONCE_VERIFICATIONS
        .with_label_values(&[status.as_str()])
        .inc();
    let code = if status.is_live() {
        StatusCode::OK
    } else {
        StatusCode::GONE
    };
    timer.observe(code.as_u16());
    debug!("Verify nonce {}: {}", nonce, status.as_str());

    let body = VerifyNonceResponse {
        nonce,
        status: status.as_str().to_string(),
    };
    Ok((code, Json(body)).into_response())
}

async fn delete_nonce_handler(
    State(app_state): State<AuthorityState>,
    Path(nonce): Path<String>,
) -> AuthorityServiceResult<Json<DeleteNonceResponse>> {
    let timer = RequestTimer::new("DELETE", "/delete-nonce");
    app_state.maybe_sweep_expired();

    let removed = match nonce.parse::<Nonce>() {
        Ok(parsed) => match app_state.authority.consume(&parsed).await {
            Ok(outcome) => outcome.removed(),
            Err(e) => {
                timer.observe(500);
                return Err(e.into());
            }
        },
        Err(_) => false,
    };

    NONCES_CONSUMED
        .with_label_values(&[if removed { "removed" } else { "already_gone" }])
        .inc();
    timer.observe(200);
    if removed {
        info!("Consumed nonce {}", nonce);
    } else {
        debug!("Delete for absent nonce {}", nonce);
    }

    Ok(Json(DeleteNonceResponse { removed }))
}

async fn health_check_handler(State(app_state): State<AuthorityState>) -> Json<serde_json::Value> {
    debug!("Health check requested");

    Json(serde_json::json!({
        "status": "healthy",
        "service": "authority",
        "sweep": app_state.sweep.name(),
        "timestamp": securecode::unix_now()
    }))
}

async fn metrics_handler() -> AuthorityServiceResult<String> {
    export_metrics().map_err(|e| AuthorityServiceError::Internal(format!("Metrics export failed: {e}")))
}
