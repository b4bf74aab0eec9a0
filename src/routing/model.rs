use std::fmt;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use crate::settings::ExtensionConfig;

/// 업스트림 서버. 별칭 도메인이 있으면 같은 값이 여러 가상 호스트에 들어갑니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamServer {
    /// `host:port`
    pub address: String,
    pub container_name: String,
    pub check_interval_ms: u64,
}

/// 백엔드 TLS 인증서 검증 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslVerify {
    #[default]
    None,
    Required,
}

impl SslVerify {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslVerify::None => "none",
            SslVerify::Required => "required",
        }
    }
}

impl std::str::FromStr for SslVerify {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SslVerify::None),
            "required" => Ok(SslVerify::Required),
            _ => Err(format!("Invalid ssl verify mode: {}", s)),
        }
    }
}

impl fmt::Display for SslVerify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 도메인 키 하나에 대한 라우팅 항목
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualHost {
    pub domain: String,
    pub server_names: Vec<String>,
    pub ssl: bool,
    pub ssl_only: bool,
    pub ssl_backend: bool,
    pub ssl_backend_verify: SslVerify,
    pub ssl_cert: Option<PathBuf>,
    pub ssl_cert_key: Option<PathBuf>,
    pub balance_algorithm: String,
    pub health_check: Option<String>,
    pub health_check_interval_ms: u64,
    pub backend_options: Vec<String>,
    pub websocket_endpoints: Vec<String>,
    pub context_root: Option<String>,
    pub context_root_rewrite: bool,
    pub upstreams: Vec<UpstreamServer>,
}

impl VirtualHost {
    /// 설정 파일에서 쓸 식별자.
    /// `.`은 `_`로, 영숫자가 아닌 나머지 바이트는 `-xx`(16진수)로 바꿉니다. 서로 다른 도메인은 서로 다른 이름이 됩니다.
    pub fn backend_name(&self) -> String {
        let mut name = String::with_capacity(self.domain.len());
        for byte in self.domain.bytes() {
            match byte {
                b'.' => name.push('_'),
                b if b.is_ascii_alphanumeric() => name.push(b as char),
                b => {
                    let _ = write!(name, "-{:02x}", b);
                }
            }
        }
        name
    }
}

/// 한 사이클의 라우팅 모델. 매번 통째로 교체됩니다.
#[derive(Debug, Clone)]
pub struct RoutingModel {
    /// 도메인 키 순으로 정렬
    pub hosts: Vec<VirtualHost>,
    pub extension: Arc<ExtensionConfig>,
}

impl RoutingModel {
    pub fn host(&self, domain: &str) -> Option<&VirtualHost> {
        self.hosts.iter().find(|h| h.domain == domain)
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn upstream_count(&self) -> usize {
        self.hosts.iter().map(|h| h.upstreams.len()).sum()
    }
}
