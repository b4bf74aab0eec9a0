use reverse_proxy_sync::cache::TouchPolicy;
use reverse_proxy_sync::settings::{BackendKind, ReloadAction, ReloadMode, Settings, SettingsError};
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 14] = [
        "PROXY_CONFIG_FILE",
        "PROXY_LOG_LEVEL",
        "PROXY_LOG_FORMAT",
        "PROXY_DOCKER_ENDPOINT",
        "PROXY_LABEL_PREFIX",
        "PROXY_DOCKER_POLL_MS",
        "PROXY_DEBOUNCE_MS",
        "PROXY_DEBOUNCE_POLICY",
        "PROXY_BACKEND",
        "PROXY_PORT",
        "PROXY_SSL_PORT",
        "PROXY_RESTART_PROXIES",
        "PROXY_ADMIN_USER",
        "PROXY_ADMIN_PASS",
    ];

    // 테스트 전후 환경변수 초기화
    fn cleanup_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    fn create_test_toml(content: &str) -> (String, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");
        std::fs::write(&file_path, content).unwrap();
        (file_path.to_str().unwrap().to_string(), dir)
    }

    #[tokio::test]
    #[serial]
    async fn test_defaults_from_env() {
        cleanup_env();

        let settings = Settings::from_env().await.unwrap();
        assert_eq!(settings.docker.endpoint, "unix:///var/run/docker.sock");
        assert_eq!(settings.docker.label_prefix, "rproxy.");
        assert_eq!(settings.docker.poll_interval(), None);
        assert_eq!(settings.debounce.window(), Duration::from_millis(500));
        assert_eq!(settings.debounce.touch_policy, TouchPolicy::Reset);
        assert_eq!(settings.extension.kind, BackendKind::Haproxy);
        assert_eq!(settings.extension.reload_mode(), ReloadMode::Relaunch);
    }

    #[tokio::test]
    #[serial]
    async fn test_env_overrides() {
        cleanup_env();
        std::env::set_var("PROXY_BACKEND", "nginx");
        std::env::set_var("PROXY_DEBOUNCE_MS", "1500");
        std::env::set_var("PROXY_DEBOUNCE_POLICY", "preserve");
        std::env::set_var("PROXY_DOCKER_POLL_MS", "30000");
        std::env::set_var("PROXY_RESTART_PROXIES", "true");

        let settings = Settings::from_env().await.unwrap();
        assert_eq!(settings.extension.kind, BackendKind::Nginx);
        assert_eq!(settings.extension.reload_mode(), ReloadMode::Signal);
        assert!(matches!(settings.extension.reload_action(), ReloadAction::Restart { .. }));
        assert_eq!(settings.debounce.window(), Duration::from_millis(1500));
        assert_eq!(settings.debounce.touch_policy, TouchPolicy::Preserve);
        assert_eq!(settings.docker.poll_interval(), Some(Duration::from_secs(30)));

        cleanup_env();
    }

    #[tokio::test]
    #[serial]
    async fn test_settings_validation() {
        cleanup_env();

        // 1. 숫자가 아닌 포트
        std::env::set_var("PROXY_PORT", "eighty");
        assert!(matches!(Settings::from_env().await, Err(SettingsError::EnvVarInvalid { .. })));
        cleanup_env();

        // 2. 잘못된 로그 레벨
        std::env::set_var("PROXY_LOG_LEVEL", "invalid_level");
        assert!(Settings::from_env().await.is_err());
        cleanup_env();

        // 3. 최소값보다 짧은 디바운스 구간
        std::env::set_var("PROXY_DEBOUNCE_MS", "10");
        assert!(matches!(Settings::from_env().await, Err(SettingsError::InvalidValue { .. })));
        cleanup_env();

        // 4. 비밀번호 없는 관리자 계정
        std::env::set_var("PROXY_ADMIN_USER", "admin");
        assert!(Settings::from_env().await.is_err());
        cleanup_env();

        // 5. 같은 HTTP/HTTPS 포트
        std::env::set_var("PROXY_PORT", "8080");
        std::env::set_var("PROXY_SSL_PORT", "8080");
        assert!(Settings::from_env().await.is_err());
        cleanup_env();
    }

    #[tokio::test]
    #[serial]
    async fn test_load_prefers_config_file() {
        cleanup_env();
        let (path, _dir) = create_test_toml(
            r#"
            [docker]
            endpoint = "tcp://127.0.0.1:2375"
            label_prefix = "lb."

            [extension]
            kind = "nginx"
            name = "edge"
            "#,
        );
        std::env::set_var("PROXY_CONFIG_FILE", &path);
        // 파일이 있으면 환경변수는 무시
        std::env::set_var("PROXY_BACKEND", "haproxy");

        let settings = Settings::load().await.unwrap();
        assert_eq!(settings.docker.endpoint, "tcp://127.0.0.1:2375");
        assert_eq!(settings.docker.engine_host(), "127.0.0.1");
        assert_eq!(settings.extension.kind, BackendKind::Nginx);
        assert_eq!(settings.extension.name(), "edge");

        cleanup_env();
    }

    #[tokio::test]
    #[serial]
    async fn test_invalid_toml_file() {
        cleanup_env();
        let (path, _dir) = create_test_toml("[docker\nendpoint = ");

        let result = Settings::from_toml_file(&path).await;
        assert!(matches!(result, Err(SettingsError::ParseError { .. })));

        let missing = Settings::from_toml_file("/nonexistent/config.toml").await;
        assert!(matches!(missing, Err(SettingsError::FileError { .. })));
    }
}
