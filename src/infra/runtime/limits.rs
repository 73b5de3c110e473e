use std::time::Duration;

use crate::infra::config::ToolConfig;

/// Build a reqwest client with sane defaults (timeouts, redirects disabled by default).
pub fn make_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(2))
        .timeout(Duration::from_secs(30))
        .build()
        .expect("reqwest client")
}

/// Same, but honoring per-upstream overrides. Streaming requests override
/// the total timeout per request, so the default here only bounds the
/// unary calls.
pub fn make_http_client_with(cfg: &ToolConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs.unwrap_or(2)))
        .timeout(Duration::from_secs(cfg.request_timeout_secs.unwrap_or(30)))
        .build()
        .expect("reqwest client")
}

/// Simple exponential backoff utility for async ops.
pub async fn retry_async<T, E, Fut, F>(attempts: u32, op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    retry_async_if(attempts, op, |_| true).await
}

/// Like `retry_async`, but only errors the predicate accepts are retried;
/// the rest short-circuit out of the loop (e.g. upstream 4xx).
pub async fn retry_async_if<T, E, Fut, F, P>(
    mut attempts: u32,
    mut op: F,
    mut retryable: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let mut try_num: u32 = 0;
    let mut delay_ms: u64 = 50;
    loop {
        match op(try_num).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempts == 0 || !retryable(&e) {
                    return Err(e);
                }
                attempts -= 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(1_000);
                try_num += 1;
            }
        }
    }
}
