//! 외부 호출 재시도 헬퍼
//!
//! 임베딩/생성 백엔드 호출은 파이프라인의 유일한 대기 지점입니다.
//! 모든 호출은 명시적 타임아웃으로 감싸고, 일시적 실패(네트워크, 타임아웃,
//! 429/5xx)만 제한된 횟수 안에서 지수 백오프로 재시도합니다.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 재시도 정책
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 첫 백오프 (ms), 이후 2배씩 증가
    pub initial_backoff_ms: u64,
    /// 호출당 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff_ms: 500,
            timeout_secs: 30,
        }
    }
}

impl RetryPolicy {
    /// 호출당 타임아웃
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// n번째 실패 후 대기 시간 (0-based)
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(1u64 << attempt.min(10)))
    }
}

/// 한 번의 호출 실패
#[derive(Debug)]
pub enum CallError {
    /// 재시도하면 성공할 수 있음
    Transient(anyhow::Error),
    /// 재시도해도 결과가 같음 (4xx, 응답 형식 오류 등)
    Permanent(anyhow::Error),
}

impl CallError {
    /// HTTP 상태 코드로 분류
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let err = anyhow::anyhow!("HTTP {}: {}", status, body);
        if status.as_u16() == 429 || status.is_server_error() {
            CallError::Transient(err)
        } else {
            CallError::Permanent(err)
        }
    }
}

/// 타임아웃 + 제한된 재시도로 비동기 호출 실행
///
/// `label`은 로그용 호출 이름입니다.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..attempts {
        let outcome = match tokio::time::timeout(policy.timeout(), op()).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Transient(anyhow::anyhow!(
                "{} timed out after {:?}",
                label,
                policy.timeout()
            ))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(CallError::Permanent(e)) => return Err(e),
            Err(CallError::Transient(e)) => {
                if attempt + 1 < attempts {
                    let backoff = policy.backoff(attempt);
                    tracing::warn!(
                        "{} failed: {:#}, retrying in {:?} (attempt {}/{})",
                        label,
                        e,
                        backoff,
                        attempt + 1,
                        attempts
                    );
                    tokio::time::sleep(backoff).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("{} failed", label))
        .context(format!("{} failed after {} attempts", label, attempts)))
}

// ============================================================================
// Tests
// ============================================================================
