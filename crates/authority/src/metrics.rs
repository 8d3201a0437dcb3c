//! Prometheus 监控指标
//!
//! 指标定义为全局静态量，既可注册到本 crate 的 [`REGISTRY`]（供 `/metrics` 导出），
//! 也可通过 [`register_authority_metrics`] 注册到外部 registry。

use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Once;
use std::time::Instant;

static METRICS_INIT: Once = Once::new();

lazy_static! {
    /// 服务自身的 Registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// nonce 注册次数（按结果）
    pub static ref NONCES_ISSUED: IntCounterVec = IntCounterVec::new(
        Opts::new("nonces_issued_total", "Total number of nonce registrations")
            .namespace("discount"),
        &["result"]
    ).unwrap();

    /// nonce 查询次数（按状态）
    pub static ref NONCE_VERIFICATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("nonce_verifications_total", "Total number of nonce verifications")
            .namespace("discount"),
        &["status"]
    ).unwrap();

    /// nonce 消费次数（按是否删除）
    pub static ref NONCES_CONSUMED: IntCounterVec = IntCounterVec::new(
        Opts::new("nonces_consumed_total", "Total number of nonce consume requests")
            .namespace("discount"),
        &["outcome"]
    ).unwrap();

    /// 清理删除的过期记录数
    pub static ref NONCES_PURGED: IntCounter = IntCounter::with_opts(
        Opts::new("nonces_purged_total", "Total number of expired nonces purged")
            .namespace("discount")
    ).unwrap();

    /// HTTP 请求延迟（秒）
    pub static ref REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("request_duration_seconds", "HTTP request duration in seconds")
            .namespace("discount")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["method", "path", "status"]
    ).unwrap();

    /// HTTP 请求总数
    pub static ref REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("requests_total", "Total number of HTTP requests")
            .namespace("discount"),
        &["method", "path", "status"]
    ).unwrap();
}

/// 将权威服务指标注册到指定 registry
pub fn register_authority_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(NONCES_ISSUED.clone()))?;
    registry.register(Box::new(NONCE_VERIFICATIONS.clone()))?;
    registry.register(Box::new(NONCES_CONSUMED.clone()))?;
    registry.register(Box::new(NONCES_PURGED.clone()))?;
    registry.register(Box::new(REQUEST_DURATION.clone()))?;
    registry.register(Box::new(REQUESTS_TOTAL.clone()))?;
    Ok(())
}

/// 注册所有指标到 [`REGISTRY`]
///
/// 幂等，只有第一次调用真正注册。
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let mut result = Ok(());
    METRICS_INIT.call_once(|| {
        result = register_authority_metrics(&REGISTRY);
    });
    result
}

/// HTTP 请求计时器
pub struct RequestTimer {
    start: Instant,
    method: &'static str,
    path: &'static str,
}

impl RequestTimer {
    pub fn new(method: &'static str, path: &'static str) -> Self {
        Self {
            start: Instant::now(),
            method,
            path,
        }
    }

    /// 完成计时并记录指标
    pub fn observe(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();
        let status = status.to_string();

        REQUEST_DURATION
            .with_label_values(&[self.method, self.path, status.as_str()])
            .observe(duration);
        REQUESTS_TOTAL
            .with_label_values(&[self.method, self.path, status.as_str()])
            .inc();
    }
}

/// 导出 Prometheus 文本格式
pub fn export_metrics() -> Result<String, prometheus::Error> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_is_idempotent() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_external_registry() {
        let registry = Registry::new();
        register_authority_metrics(&registry).unwrap();
        // 同一 registry 重复注册会失败
        assert!(register_authority_metrics(&registry).is_err());
    }

    #[test]
    fn test_request_timer_and_export() {
        register_metrics().unwrap();

        let before = REQUESTS_TOTAL
            .with_label_values(&["GET", "/timer-test", "200"])
            .get();
        RequestTimer::new("GET", "/timer-test").observe(200);
        let after = REQUESTS_TOTAL
            .with_label_values(&["GET", "/timer-test", "200"])
            .get();
        assert_eq!(after, before + 1);

        let output = export_metrics().unwrap();
        assert!(output.contains("discount_requests_total"));
    }
}
