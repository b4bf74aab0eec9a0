use std::path::PathBuf;
use std::time::Duration;
use serde::Deserialize;
use super::{parse_env_var, parse_optional_env_var, SettingsError};

pub type Result<T> = std::result::Result<T, SettingsError>;

/// 설정을 생성할 프록시 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Haproxy,
    Nginx,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Haproxy => "haproxy",
            BackendKind::Nginx => "nginx",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "haproxy" => Ok(BackendKind::Haproxy),
            "nginx" => Ok(BackendKind::Nginx),
            _ => Err(format!("Invalid backend kind: {}", s)),
        }
    }
}

/// 리로드 프로토콜
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadMode {
    /// 새 프로세스를 띄우고 기존 프로세스를 드레인
    Relaunch,
    /// 실행 중인 프록시 컨테이너에 시그널/재시작
    Signal,
}

impl std::str::FromStr for ReloadMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relaunch" => Ok(ReloadMode::Relaunch),
            "signal" => Ok(ReloadMode::Signal),
            _ => Err(format!("Invalid reload mode: {}", s)),
        }
    }
}

/// 프록시 컨테이너에 적용할 리로드 동작
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadAction {
    Signal(String),
    Restart { timeout_secs: isize },
}

/// 운영자가 지정하는 정적 프록시 설정. 코어에서는 읽기 전용입니다.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtensionConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// 관리 대상 프록시 컨테이너를 식별하는 `ext.name` 라벨 값 (기본값: kind)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub config_path: Option<PathBuf>,

    #[serde(default = "default_pid_path")]
    pub pid_path: PathBuf,

    /// relaunch 모드에서 실행할 프록시 바이너리
    #[serde(default = "default_proxy_binary")]
    pub proxy_binary: String,

    #[serde(default)]
    pub reload_mode: Option<ReloadMode>,

    #[serde(default = "default_reload_signal")]
    pub reload_signal: String,

    /// signal 모드에서 시그널 대신 컨테이너 재시작
    #[serde(default)]
    pub restart_proxies: bool,

    #[serde(default = "default_restart_timeout")]
    pub restart_timeout_secs: isize,

    /// relaunch 중 SYN 패킷 드롭 사용 여부 (권한 있는 리눅스 호스트 필요)
    #[serde(default = "default_true")]
    pub syn_drop: bool,

    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,

    /// 모든 업스트림 호스트를 이 주소로 대체
    #[serde(default)]
    pub backend_override_address: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ssl_port")]
    pub ssl_port: u16,

    /// 기본 인증서 (haproxy bind crt / nginx 기본 인증서)
    #[serde(default)]
    pub ssl_cert: Option<String>,

    #[serde(default)]
    pub ssl_cert_key: Option<String>,

    /// 라벨로 지정한 인증서 파일명의 기준 디렉토리
    #[serde(default = "default_ssl_cert_dir")]
    pub ssl_cert_dir: PathBuf,

    #[serde(default)]
    pub ssl_opts: Option<String>,

    #[serde(default)]
    pub ssl_default_dh_param: Option<u32>,

    #[serde(default)]
    pub ssl_server_verify: Option<String>,

    #[serde(default = "default_ssl_protocols")]
    pub ssl_protocols: String,

    #[serde(default = "default_ssl_ciphers")]
    pub ssl_ciphers: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_client_timeout_ms")]
    pub client_timeout_ms: u64,

    #[serde(default = "default_server_timeout_ms")]
    pub server_timeout_ms: u64,

    #[serde(default = "default_max_conn")]
    pub max_conn: u32,

    #[serde(default)]
    pub admin_user: Option<String>,

    #[serde(default)]
    pub admin_pass: Option<String>,

    #[serde(default)]
    pub syslog_addr: Option<String>,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_worker_processes")]
    pub worker_processes: u32,

    #[serde(default = "default_rlimit_nofile")]
    pub rlimit_nofile: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// nginx proxy_* / send 타임아웃 (초)
    #[serde(default = "default_proxy_timeout")]
    pub proxy_connect_timeout: u32,

    #[serde(default = "default_proxy_timeout")]
    pub proxy_send_timeout: u32,

    #[serde(default = "default_proxy_timeout")]
    pub proxy_read_timeout: u32,

    #[serde(default = "default_proxy_timeout")]
    pub send_timeout: u32,

    /// ssl_cert_dir 변경 감시 후 리로드
    #[serde(default)]
    pub watch_certs: bool,
}

impl ExtensionConfig {
    pub fn from_env() -> Result<Self> {
        let kind: BackendKind = parse_env_var("PROXY_BACKEND", BackendKind::default)?;
        let config = Self {
            kind,
            name: parse_optional_env_var("PROXY_EXT_NAME")?,
            config_path: parse_optional_env_var("PROXY_CONFIG_PATH")?,
            pid_path: parse_env_var("PROXY_PID_PATH", default_pid_path)?,
            proxy_binary: parse_env_var("PROXY_BINARY", default_proxy_binary)?,
            reload_mode: parse_optional_env_var("PROXY_RELOAD_MODE")?,
            reload_signal: parse_env_var("PROXY_RELOAD_SIGNAL", default_reload_signal)?,
            restart_proxies: parse_env_var("PROXY_RESTART_PROXIES", || false)?,
            restart_timeout_secs: parse_env_var("PROXY_RESTART_TIMEOUT", default_restart_timeout)?,
            syn_drop: parse_env_var("PROXY_SYN_DROP", default_true)?,
            drain_grace_ms: parse_env_var("PROXY_DRAIN_GRACE_MS", default_drain_grace_ms)?,
            backend_override_address: parse_optional_env_var("PROXY_BACKEND_OVERRIDE_ADDRESS")?,
            port: parse_env_var("PROXY_PORT", default_port)?,
            ssl_port: parse_env_var("PROXY_SSL_PORT", default_ssl_port)?,
            ssl_cert: parse_optional_env_var("PROXY_SSL_CERT")?,
            ssl_cert_key: parse_optional_env_var("PROXY_SSL_CERT_KEY")?,
            ssl_cert_dir: parse_env_var("PROXY_SSL_CERT_DIR", default_ssl_cert_dir)?,
            ssl_opts: parse_optional_env_var("PROXY_SSL_OPTS")?,
            ssl_default_dh_param: parse_optional_env_var("PROXY_SSL_DH_PARAM")?,
            ssl_server_verify: parse_optional_env_var("PROXY_SSL_SERVER_VERIFY")?,
            ssl_protocols: parse_env_var("PROXY_SSL_PROTOCOLS", default_ssl_protocols)?,
            ssl_ciphers: parse_env_var("PROXY_SSL_CIPHERS", default_ssl_ciphers)?,
            connect_timeout_ms: parse_env_var("PROXY_CONNECT_TIMEOUT_MS", default_connect_timeout_ms)?,
            client_timeout_ms: parse_env_var("PROXY_CLIENT_TIMEOUT_MS", default_client_timeout_ms)?,
            server_timeout_ms: parse_env_var("PROXY_SERVER_TIMEOUT_MS", default_server_timeout_ms)?,
            max_conn: parse_env_var("PROXY_MAX_CONN", default_max_conn)?,
            admin_user: parse_optional_env_var("PROXY_ADMIN_USER")?,
            admin_pass: parse_optional_env_var("PROXY_ADMIN_PASS")?,
            syslog_addr: parse_optional_env_var("PROXY_SYSLOG_ADDR")?,
            user: parse_env_var("PROXY_USER", default_user)?,
            worker_processes: parse_env_var("PROXY_WORKER_PROCESSES", default_worker_processes)?,
            rlimit_nofile: parse_env_var("PROXY_RLIMIT_NOFILE", default_rlimit_nofile)?,
            max_connections: parse_env_var("PROXY_MAX_CONNECTIONS", default_max_connections)?,
            proxy_connect_timeout: parse_env_var("PROXY_PROXY_CONNECT_TIMEOUT", default_proxy_timeout)?,
            proxy_send_timeout: parse_env_var("PROXY_PROXY_SEND_TIMEOUT", default_proxy_timeout)?,
            proxy_read_timeout: parse_env_var("PROXY_PROXY_READ_TIMEOUT", default_proxy_timeout)?,
            send_timeout: parse_env_var("PROXY_SEND_TIMEOUT", default_proxy_timeout)?,
            watch_certs: parse_env_var("PROXY_WATCH_CERTS", || false)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 || self.ssl_port == 0 {
            return Err(SettingsError::invalid(
                "extension.port",
                format!("{}/{}", self.port, self.ssl_port),
                "포트는 0이 될 수 없습니다",
            ));
        }

        if self.port == self.ssl_port {
            return Err(SettingsError::invalid(
                "extension.port/extension.ssl_port",
                format!("{}/{}", self.port, self.ssl_port),
                "HTTP와 HTTPS 포트는 달라야 합니다",
            ));
        }

        if self.admin_user.is_some() != self.admin_pass.is_some() {
            return Err(SettingsError::invalid(
                "extension.admin_user/extension.admin_pass",
                "",
                "관리자 계정과 비밀번호는 함께 지정해야 합니다",
            ));
        }

        if self.reload_mode() == ReloadMode::Relaunch && self.proxy_binary.trim().is_empty() {
            return Err(SettingsError::invalid(
                "extension.proxy_binary",
                &self.proxy_binary,
                "relaunch 모드에는 프록시 바이너리가 필요합니다",
            ));
        }

        Ok(())
    }

    /// 관리 대상 프록시 컨테이너의 `ext.name` 라벨 값
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(|| match self.kind {
            BackendKind::Haproxy => PathBuf::from("/usr/local/etc/haproxy/haproxy.cfg"),
            BackendKind::Nginx => PathBuf::from("/etc/nginx/nginx.conf"),
        })
    }

    /// 명시하지 않으면 haproxy는 relaunch, nginx는 signal
    pub fn reload_mode(&self) -> ReloadMode {
        self.reload_mode.unwrap_or(match self.kind {
            BackendKind::Haproxy => ReloadMode::Relaunch,
            BackendKind::Nginx => ReloadMode::Signal,
        })
    }

    pub fn reload_action(&self) -> ReloadAction {
        if self.restart_proxies {
            ReloadAction::Restart { timeout_secs: self.restart_timeout_secs }
        } else {
            ReloadAction::Signal(self.reload_signal.clone())
        }
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    /// SYN 드롭 대상 리슨 포트
    pub fn listen_ports(&self) -> Vec<u16> {
        let mut ports = vec![self.port];
        if self.ssl_cert.is_some() {
            ports.push(self.ssl_port);
        }
        ports
    }
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            name: None,
            config_path: None,
            pid_path: default_pid_path(),
            proxy_binary: default_proxy_binary(),
            reload_mode: None,
            reload_signal: default_reload_signal(),
            restart_proxies: false,
            restart_timeout_secs: default_restart_timeout(),
            syn_drop: default_true(),
            drain_grace_ms: default_drain_grace_ms(),
            backend_override_address: None,
            port: default_port(),
            ssl_port: default_ssl_port(),
            ssl_cert: None,
            ssl_cert_key: None,
            ssl_cert_dir: default_ssl_cert_dir(),
            ssl_opts: None,
            ssl_default_dh_param: None,
            ssl_server_verify: None,
            ssl_protocols: default_ssl_protocols(),
            ssl_ciphers: default_ssl_ciphers(),
            connect_timeout_ms: default_connect_timeout_ms(),
            client_timeout_ms: default_client_timeout_ms(),
            server_timeout_ms: default_server_timeout_ms(),
            max_conn: default_max_conn(),
            admin_user: None,
            admin_pass: None,
            syslog_addr: None,
            user: default_user(),
            worker_processes: default_worker_processes(),
            rlimit_nofile: default_rlimit_nofile(),
            max_connections: default_max_connections(),
            proxy_connect_timeout: default_proxy_timeout(),
            proxy_send_timeout: default_proxy_timeout(),
            proxy_read_timeout: default_proxy_timeout(),
            send_timeout: default_proxy_timeout(),
            watch_certs: false,
        }
    }
}

fn default_true() -> bool { true }
fn default_pid_path() -> PathBuf { PathBuf::from("/var/run/proxy.pid") }
fn default_proxy_binary() -> String { "haproxy".to_string() }
fn default_reload_signal() -> String { "SIGHUP".to_string() }
fn default_restart_timeout() -> isize { 10 }
fn default_drain_grace_ms() -> u64 { 1000 }
fn default_port() -> u16 { 80 }
fn default_ssl_port() -> u16 { 443 }
fn default_ssl_cert_dir() -> PathBuf { PathBuf::from("/certs") }
fn default_ssl_protocols() -> String { "TLSv1.2 TLSv1.3".to_string() }
fn default_ssl_ciphers() -> String { "HIGH:!aNULL:!MD5".to_string() }
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_client_timeout_ms() -> u64 { 10000 }
fn default_server_timeout_ms() -> u64 { 10000 }
fn default_max_conn() -> u32 { 1024 }
fn default_user() -> String { "www-data".to_string() }
fn default_worker_processes() -> u32 { 2 }
fn default_rlimit_nofile() -> u32 { 65535 }
fn default_max_connections() -> u32 { 2048 }
fn default_proxy_timeout() -> u32 { 600 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_backend_kind() {
        let haproxy = ExtensionConfig::default();
        assert_eq!(haproxy.kind, BackendKind::Haproxy);
        assert_eq!(haproxy.reload_mode(), ReloadMode::Relaunch);
        assert_eq!(haproxy.name(), "haproxy");

        let nginx: ExtensionConfig = toml::from_str("kind = \"nginx\"").unwrap();
        assert_eq!(nginx.reload_mode(), ReloadMode::Signal);
        assert_eq!(nginx.config_path(), PathBuf::from("/etc/nginx/nginx.conf"));
    }

    #[test]
    fn test_listen_ports_include_ssl_only_with_cert() {
        let mut config = ExtensionConfig::default();
        assert_eq!(config.listen_ports(), vec![80]);

        config.ssl_cert = Some("/certs/default.pem".to_string());
        assert_eq!(config.listen_ports(), vec![80, 443]);
    }

    #[test]
    fn test_admin_credentials_must_be_paired() {
        let mut config = ExtensionConfig::default();
        config.admin_user = Some("admin".to_string());
        assert!(config.validate().is_err());

        config.admin_pass = Some("secret".to_string());
        assert!(config.validate().is_ok());
    }
}
