use std::{env, fs, path::Path, time::Duration};
use serde::Deserialize;
use tracing::debug;

mod vars;
mod error;
pub mod logging;
mod tls;
pub mod docker;
pub mod extension;

pub use logging::LogSettings;
pub use tls::DockerTlsSettings;
pub use docker::{DockerSettings, RetrySettings};
pub use extension::{BackendKind, ExtensionConfig, ReloadAction, ReloadMode};
pub use error::SettingsError;
pub use vars::{parse_env_var, parse_optional_env_var};

use crate::cache::{TouchPolicy, MIN_TTL};

pub type Result<T> = std::result::Result<T, SettingsError>;

/// 리로드 디바운스 설정
#[derive(Debug, Clone, Deserialize)]
pub struct DebounceSettings {
    /// 조용한 구간 길이 (밀리초, 최소 100)
    #[serde(default = "default_debounce_ms")]
    pub window_ms: u64,

    /// 기존 키를 다시 set 했을 때 타이머 처리 방식
    #[serde(default)]
    pub touch_policy: TouchPolicy,
}

impl DebounceSettings {
    pub fn from_env() -> Result<Self> {
        let settings = Self {
            window_ms: parse_env_var("PROXY_DEBOUNCE_MS", default_debounce_ms)?,
            touch_policy: parse_env_var("PROXY_DEBOUNCE_POLICY", TouchPolicy::default)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window() < MIN_TTL {
            return Err(SettingsError::invalid(
                "debounce.window_ms",
                self.window_ms,
                format!("디바운스 구간은 최소 {}ms 이상이어야 합니다", MIN_TTL.as_millis()),
            ));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            window_ms: default_debounce_ms(),
            touch_policy: TouchPolicy::default(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    // 로깅 설정
    #[serde(default)]
    pub logging: LogSettings,

    // Docker 연결 설정
    #[serde(default)]
    pub docker: DockerSettings,

    // 디바운스 설정
    #[serde(default)]
    pub debounce: DebounceSettings,

    // 프록시 설정 생성/리로드
    #[serde(default)]
    pub extension: ExtensionConfig,
}

impl Settings {
    pub async fn load() -> Result<Self> {
        if let Ok(config_path) = env::var("PROXY_CONFIG_FILE") {
            Self::from_toml_file(&config_path).await
        } else {
            Self::from_env().await
        }
    }

    pub async fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| SettingsError::FileError {
            path: path.as_ref().to_string_lossy().to_string(),
            error: e,
        })?;

        let settings: Self = toml::from_str(&content)
            .map_err(|e| SettingsError::ParseError { source: e })?;

        debug!(path = %path.as_ref().display(), "TOML 설정 로드");
        settings.validate()?;
        Ok(settings)
    }

    pub async fn from_env() -> Result<Self> {
        let settings = Self {
            logging: LogSettings::from_env()?,
            docker: DockerSettings::from_env()?,
            debounce: DebounceSettings::from_env()?,
            extension: ExtensionConfig::from_env()?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// 설정 유효성 검증. TLS 자료는 여기서 함께 확인하며 실패는 치명적입니다.
    pub fn validate(&self) -> Result<()> {
        self.docker.validate()?;
        self.debounce.validate()?;
        self.extension.validate()?;
        if let Some(tls) = &self.docker.tls {
            tls.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_toml() {
        let toml_content = r#"
            [logging]
            format = "json"
            level = "debug"

            [docker]
            endpoint = "tcp://10.1.2.3:2375"
            label_prefix = "lb."

            [debounce]
            window_ms = 750
            touch_policy = "preserve"

            [extension]
            kind = "nginx"
            port = 8080
            ssl_port = 8443
        "#;

        let settings: Settings = toml::from_str(toml_content).unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.docker.label_prefix, "lb.");
        assert_eq!(settings.debounce.window(), Duration::from_millis(750));
        assert_eq!(settings.debounce.touch_policy, TouchPolicy::Preserve);
        assert_eq!(settings.extension.kind, BackendKind::Nginx);
        assert_eq!(settings.extension.port, 8080);
    }

    #[test]
    fn test_debounce_floor_is_enforced() {
        let settings: Settings = toml::from_str("[debounce]\nwindow_ms = 50").unwrap();
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidValue { .. })));
    }
}
