//! Docker API 호출 재시도.
//!
//! 사이클 안에서만 쓰입니다. 엔진 연결 자체의 재시도는 `ConnectionSupervisor`가 맡습니다.

use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};
use crate::docker::DockerError;
use crate::settings::RetrySettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 첫 시도를 포함한 횟수
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            interval: Duration::from_secs(settings.interval),
        }
    }
}

#[async_trait]
pub trait RetryableOperation {
    type Output;

    async fn execute(&self) -> Result<Self::Output, DockerError>;

    /// 로그에 남길 작업 이름
    fn describe(&self) -> &'static str {
        "Docker API 호출"
    }

    /// 설정 오류처럼 다시 해도 같은 결과인 실패는 바로 돌려줍니다.
    fn should_retry(&self, error: &DockerError) -> bool {
        error.is_retryable()
    }
}

/// 재시도할 수 없는 실패이거나 횟수를 다 쓰면 마지막 에러를 그대로 돌려줍니다.
pub async fn with_retry<T: RetryableOperation>(
    operation: T,
    policy: RetryPolicy,
) -> Result<T::Output, DockerError> {
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation.execute().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = operation.describe(), attempt, "재시도 후 성공");
                }
                return Ok(result);
            }
            Err(error) => error,
        };

        if !operation.should_retry(&error) {
            return Err(error);
        }
        if attempt >= policy.max_attempts {
            warn!(
                operation = operation.describe(),
                error = %error,
                attempts = attempt,
                "재시도 횟수 소진"
            );
            return Err(error);
        }

        warn!(
            operation = operation.describe(),
            error = %error,
            attempt,
            max_attempts = policy.max_attempts,
            retry_in = ?policy.interval,
            "Docker 작업 실패, 재시도 예정"
        );
        sleep(policy.interval).await;
    }
}
