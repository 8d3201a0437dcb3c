//! Nonce Authority - 折扣码 nonce 注册、查询与消费服务
//!
//! 权威服务是防重放的唯一事实来源：
//! 1. 签发端在签名前注册 nonce（带过期时间与 key_id），重复注册被拒绝
//! 2. 校验端查询 nonce 是否存在且未过期
//! 3. 兑换时删除 nonce，并发删除只有一个成功
//!
//! 存储使用 SQLite（sqlx），对外提供 axum HTTP 接口，
//! 远端调用方使用 [`HttpAuthority`]。

pub mod client;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod sqlite;
pub mod sweep;
pub mod types;

// Re-export commonly used items
pub use client::HttpAuthority;
pub use discount_common::config::{AuthorityServiceConfig, ClientConfig, SweepPolicy};
pub use error::{AuthorityServiceError, AuthorityServiceResult};
pub use handlers::{AuthorityState, create_authority_state, create_router};
pub use metrics::{register_authority_metrics, register_metrics};
pub use sqlite::SqliteAuthority;
pub use sweep::{spawn_sweeper, sweep_once};
pub use types::{DeleteNonceResponse, SubmitNonceForm, SubmitNonceResponse, VerifyNonceResponse};
