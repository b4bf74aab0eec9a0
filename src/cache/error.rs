use std::fmt;
use std::time::Duration;

#[derive(Debug, PartialEq)]
pub enum CacheError {
    /// TTL이 운영 하한보다 짧음
    TtlTooShort {
        ttl: Duration,
        min: Duration,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::TtlTooShort { ttl, min } =>
                write!(f, "TTL {}ms는 최소값 {}ms보다 짧습니다", ttl.as_millis(), min.as_millis()),
        }
    }
}

impl std::error::Error for CacheError {}
