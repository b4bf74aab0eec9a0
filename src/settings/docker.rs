use std::time::Duration;
use serde::Deserialize;
use url::Url;
use super::{parse_env_var, parse_optional_env_var, DockerTlsSettings, SettingsError};
pub type Result<T> = std::result::Result<T, SettingsError>;

/// 스냅샷 조회 재시도 설정
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// 최대 시도 횟수
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// 재시도 간격 (초)
    #[serde(default = "default_retry_interval")]
    pub interval: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval: default_retry_interval(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    2 // 2초
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockerSettings {
    /// Docker 엔진 엔드포인트 (unix://, tcp://, http://, https://)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// 라벨 접두사
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,

    /// 이벤트 스트림 재연결 시 다이얼 간격 (밀리초)
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// 설정 시 컨테이너 목록 폴링도 함께 수행 (밀리초)
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// 컨테이너 메타데이터를 환경 변수에서 읽을지 여부
    #[serde(default)]
    pub env_metadata: bool,

    /// TCP 엔드포인트용 클라이언트 TLS
    #[serde(default)]
    pub tls: Option<DockerTlsSettings>,

    /// 스냅샷 조회 재시도
    #[serde(default)]
    pub retry: RetrySettings,
}

impl DockerSettings {
    pub fn from_env() -> Result<Self> {
        let settings = Self {
            endpoint: parse_env_var("PROXY_DOCKER_ENDPOINT", default_endpoint)?,
            label_prefix: parse_env_var("PROXY_LABEL_PREFIX", default_label_prefix)?,
            reconnect_interval_ms: parse_env_var("PROXY_DOCKER_RECONNECT_MS", default_reconnect_interval_ms)?,
            poll_interval_ms: parse_optional_env_var("PROXY_DOCKER_POLL_MS")?,
            env_metadata: parse_env_var("PROXY_ENV_METADATA", || false)?,
            tls: DockerTlsSettings::from_env()?,
            retry: RetrySettings {
                max_attempts: parse_env_var("PROXY_DOCKER_RETRY_ATTEMPTS", default_max_attempts)?,
                interval: parse_env_var("PROXY_DOCKER_RETRY_INTERVAL", default_retry_interval)?,
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint).map_err(|e| SettingsError::invalid(
            "docker.endpoint",
            &self.endpoint,
            format!("엔드포인트 URL 파싱 실패: {}", e),
        ))?;

        match url.scheme() {
            "unix" | "tcp" | "http" | "https" => {}
            scheme => {
                return Err(SettingsError::invalid(
                    "docker.endpoint",
                    &self.endpoint,
                    format!("지원하지 않는 스킴: {}", scheme),
                ));
            }
        }

        // 라벨 접두사 길이 제한
        if self.label_prefix.len() > 100 {
            return Err(SettingsError::invalid(
                "docker.label_prefix",
                &self.label_prefix,
                "라벨 접두사가 너무 깁니다 (최대 100자)",
            ));
        }

        if !self.label_prefix.ends_with('.') {
            return Err(SettingsError::invalid(
                "docker.label_prefix",
                &self.label_prefix,
                "라벨 접두사는 '.'으로 끝나야 합니다",
            ));
        }

        if self.reconnect_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "docker.reconnect_interval_ms",
                self.reconnect_interval_ms,
                "재연결 간격은 0일 수 없습니다",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(SettingsError::invalid(
                "docker.retry.max_attempts",
                self.retry.max_attempts,
                "최소 1회 이상 시도해야 합니다",
            ));
        }

        Ok(())
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    /// 포트 바인딩이 0.0.0.0일 때 사용할 엔진 호스트 주소
    pub fn engine_host(&self) -> String {
        Url::parse(&self.endpoint)
            .ok()
            .filter(|url| url.scheme() != "unix")
            .and_then(|url| url.host_str().map(String::from))
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            label_prefix: default_label_prefix(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            poll_interval_ms: None,
            env_metadata: false,
            tls: None,
            retry: RetrySettings::default(),
        }
    }
}

fn default_endpoint() -> String {
    "unix:///var/run/docker.sock".to_string()
}

fn default_label_prefix() -> String {
    "rproxy.".to_string()
}

fn default_reconnect_interval_ms() -> u64 {
    1000
}
