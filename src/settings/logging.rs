use serde::{Deserialize, Deserializer};
use std::env;
use std::path::{Path, PathBuf};
use tracing::Level;
use super::{parse_env_var, SettingsError};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// 로그 출력 대상. 파일은 일 단위로 롤링됩니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LogOutput {
    #[default]
    Stdout,
    File(PathBuf),
}

impl LogOutput {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "" | "stdout" => LogOutput::Stdout,
            _ => LogOutput::File(PathBuf::from(value)),
        }
    }

    /// 롤링 파일 appender에 넘길 (디렉토리, 파일 접두사)
    pub fn file_parts(&self) -> Option<(PathBuf, String)> {
        match self {
            LogOutput::Stdout => None,
            LogOutput::File(path) => {
                let dir = path.parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                let prefix = path.file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| "reverse-proxy-sync.log".to_string());
                Some((dir, prefix))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub format: LogFormat,
    pub level: Level,
    pub output: LogOutput,
}

impl LogSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Ok(Self {
            format: parse_env_var("PROXY_LOG_FORMAT", || LogFormat::Text)?,
            level: parse_log_level(env::var("PROXY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))?,
            output: LogOutput::parse(&env::var("PROXY_LOG_OUTPUT").unwrap_or_default()),
        })
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: Level::INFO,
            output: LogOutput::default(),
        }
    }
}

fn parse_log_level(level: String) -> Result<Level, SettingsError> {
    match level.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(SettingsError::EnvVarInvalid {
            var_name: "PROXY_LOG_LEVEL".to_string(),
            value: level,
            reason: "유효하지 않은 로그 레벨".to_string(),
        }),
    }
}

impl<'de> Deserialize<'de> for LogSettings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Helper {
            #[serde(default)]
            format: LogFormat,
            #[serde(default = "default_log_level_string")]
            level: String,
            #[serde(default)]
            output: String,
        }

        let helper = Helper::deserialize(deserializer)?;
        let level = parse_log_level(helper.level).map_err(serde::de::Error::custom)?;

        Ok(LogSettings {
            format: helper.format,
            level,
            output: LogOutput::parse(&helper.output),
        })
    }
}

fn default_log_level_string() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_output_splits_directory_and_prefix() {
        let output = LogOutput::parse("/var/log/rproxy/sync.log");
        let (dir, prefix) = output.file_parts().unwrap();
        assert_eq!(dir, PathBuf::from("/var/log/rproxy"));
        assert_eq!(prefix, "sync.log");

        assert_eq!(LogOutput::parse("stdout").file_parts(), None);
    }

    #[test]
    fn test_invalid_level_in_toml_is_rejected() {
        let result: Result<LogSettings, _> = toml::from_str("level = \"loud\"");
        assert!(result.is_err());
    }
}
