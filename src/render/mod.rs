//! 라우팅 모델을 프록시 설정 파일로 렌더링합니다.
//!
//! 렌더링은 메모리 버퍼에서 끝까지 수행하고, 성공한 경우에만 대상 파일을 덮어씁니다.
//! 같은 모델과 설정에는 항상 같은 바이트열이 나옵니다.

mod error;
mod haproxy;
mod nginx;

pub use error::RenderError;
pub use haproxy::HaproxyRenderer;
pub use nginx::NginxRenderer;

use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::routing::RoutingModel;
use crate::settings::BackendKind;

pub const GENERATED_HEADER: &str = "# Generated by reverse_proxy_sync. Manual changes will be overwritten.";

pub trait ConfigRenderer: Send + Sync {
    fn render(&self, model: &RoutingModel) -> Result<String, RenderError>;

    fn kind(&self) -> BackendKind;
}

pub fn renderer_for(kind: BackendKind) -> Box<dyn ConfigRenderer> {
    match kind {
        BackendKind::Haproxy => Box::new(HaproxyRenderer),
        BackendKind::Nginx => Box::new(NginxRenderer),
    }
}

/// 렌더링된 설정을 파일에 기록하고 디스크까지 동기화합니다.
pub async fn write_config(path: &Path, contents: &str) -> Result<(), RenderError> {
    let io_error = |error| RenderError::Io {
        path: path.to_path_buf(),
        error,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(io_error)?;
    file.write_all(contents.as_bytes()).await.map_err(io_error)?;
    file.flush().await.map_err(io_error)?;
    file.sync_all().await.map_err(io_error)?;

    debug!(path = %path.display(), bytes = contents.len(), "설정 파일 기록 완료");
    Ok(())
}

/// 공백 없이 한 토큰이어야 하는 값 (도메인, 주소, 이름)
pub(crate) fn token<'a>(field: &str, value: &'a str) -> Result<&'a str, RenderError> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || is_structural(c)) {
        return Err(RenderError::unsafe_value(field, value));
    }
    Ok(value)
}

/// 공백은 허용하지만 지시어 구조를 깨는 문자는 허용하지 않는 값 (헬스체크, 옵션)
pub(crate) fn phrase<'a>(field: &str, value: &'a str) -> Result<&'a str, RenderError> {
    if value.trim().is_empty() || value.chars().any(|c| c == '\n' || c == '\r' || is_structural(c)) {
        return Err(RenderError::unsafe_value(field, value));
    }
    Ok(value)
}

fn is_structural(c: char) -> bool {
    matches!(c, ';' | '{' | '}' | '#')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::routing::{SslVerify, UpstreamServer, VirtualHost};
    use crate::settings::ExtensionConfig;

    pub(crate) fn sample_host(domain: &str, addresses: &[&str]) -> VirtualHost {
        VirtualHost {
            domain: domain.to_string(),
            server_names: vec![domain.to_string()],
            ssl: false,
            ssl_only: false,
            ssl_backend: false,
            ssl_backend_verify: SslVerify::None,
            ssl_cert: None,
            ssl_cert_key: None,
            balance_algorithm: "roundrobin".to_string(),
            health_check: None,
            health_check_interval_ms: 10_000,
            backend_options: Vec::new(),
            websocket_endpoints: Vec::new(),
            context_root: None,
            context_root_rewrite: false,
            upstreams: addresses
                .iter()
                .enumerate()
                .map(|(i, address)| UpstreamServer {
                    address: address.to_string(),
                    container_name: format!("web-{}", i),
                    check_interval_ms: 10_000,
                })
                .collect(),
        }
    }

    pub(crate) fn model_with(hosts: Vec<VirtualHost>) -> RoutingModel {
        model_for(hosts, ExtensionConfig::default())
    }

    pub(crate) fn model_for(hosts: Vec<VirtualHost>, extension: ExtensionConfig) -> RoutingModel {
        RoutingModel {
            hosts,
            extension: Arc::new(extension),
        }
    }

    #[test]
    fn test_value_checks() {
        assert!(token("domain", "web.example.com").is_ok());
        assert!(token("domain", "web example.com").is_err());
        assert!(token("domain", "x;}").is_err());
        assert!(phrase("health_check", "GET /health").is_ok());
        assert!(phrase("health_check", "GET /\n}").is_err());
    }

    #[tokio::test]
    async fn test_write_config_truncates_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.cfg");
        std::fs::write(&path, "old contents that are longer than the new ones").unwrap();

        write_config(&path, "new").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }
}
