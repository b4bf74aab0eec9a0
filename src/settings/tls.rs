use std::fs::File;
use std::io::BufReader;
use std::{env, path::{Path, PathBuf}};
use rustls_pemfile::Item;
use serde::Deserialize;
use super::SettingsError;

/// Docker API(TCP) 연결에 사용할 클라이언트 TLS 자료
#[derive(Debug, Clone, Deserialize)]
pub struct DockerTlsSettings {
    /// CA 인증서 경로
    pub ca_path: PathBuf,

    /// 클라이언트 인증서 경로
    pub cert_path: PathBuf,

    /// 클라이언트 개인키 경로
    pub key_path: PathBuf,
}

impl DockerTlsSettings {
    /// `PROXY_DOCKER_TLS_CA`/`_CERT`/`_KEY`가 모두 있을 때만 TLS를 사용합니다.
    pub fn from_env() -> Result<Option<Self>, SettingsError> {
        let ca = env::var("PROXY_DOCKER_TLS_CA").ok();
        let cert = env::var("PROXY_DOCKER_TLS_CERT").ok();
        let key = env::var("PROXY_DOCKER_TLS_KEY").ok();

        match (ca, cert, key) {
            (None, None, None) => Ok(None),
            (Some(ca), Some(cert), Some(key)) => Ok(Some(Self {
                ca_path: PathBuf::from(ca),
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            })),
            (ca, cert, _) => {
                let missing = if ca.is_none() {
                    "PROXY_DOCKER_TLS_CA"
                } else if cert.is_none() {
                    "PROXY_DOCKER_TLS_CERT"
                } else {
                    "PROXY_DOCKER_TLS_KEY"
                };
                Err(SettingsError::EnvVarMissing { var_name: missing.to_string() })
            }
        }
    }

    /// 세 파일이 모두 존재하고 PEM으로 읽히는지 검증합니다.
    /// 시작 시점에 실패하면 프로세스를 중단해야 합니다.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let ca = read_pem_items(&self.ca_path)?;
        if !ca.iter().any(|item| matches!(item, Item::X509Certificate(_))) {
            return Err(tls_error(&self.ca_path, "CA 인증서가 없습니다"));
        }

        let cert = read_pem_items(&self.cert_path)?;
        if !cert.iter().any(|item| matches!(item, Item::X509Certificate(_))) {
            return Err(tls_error(&self.cert_path, "클라이언트 인증서가 없습니다"));
        }

        let key = read_pem_items(&self.key_path)?;
        let has_key = key.iter().any(|item| matches!(
            item,
            Item::RSAKey(_) | Item::PKCS8Key(_) | Item::ECKey(_)
        ));
        if !has_key {
            return Err(tls_error(&self.key_path, "개인키가 없습니다"));
        }

        Ok(())
    }
}

fn read_pem_items(path: &Path) -> Result<Vec<Item>, SettingsError> {
    let file = File::open(path).map_err(|e| SettingsError::FileError {
        path: path.to_string_lossy().to_string(),
        error: e,
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::read_all(&mut reader)
        .map_err(|e| tls_error(path, format!("PEM 파싱 실패: {}", e)))
}

fn tls_error(path: &Path, reason: impl Into<String>) -> SettingsError {
    SettingsError::TlsMaterial {
        path: path.to_string_lossy().to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_fail_validation() {
        let settings = DockerTlsSettings {
            ca_path: PathBuf::from("/nonexistent/ca.pem"),
            cert_path: PathBuf::from("/nonexistent/cert.pem"),
            key_path: PathBuf::from("/nonexistent/key.pem"),
        };
        assert!(matches!(settings.validate(), Err(SettingsError::FileError { .. })));
    }

    #[test]
    fn test_non_pem_content_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, "not a certificate").unwrap();

        let settings = DockerTlsSettings {
            ca_path: path.clone(),
            cert_path: path.clone(),
            key_path: path,
        };
        assert!(matches!(settings.validate(), Err(SettingsError::TlsMaterial { .. })));
    }
}
