use std::fmt;
use std::path::PathBuf;
use crate::docker::DockerError;

#[derive(Debug)]
pub enum ReloadError {
    /// 프록시 프로세스 실행 실패
    Launch {
        binary: String,
        error: std::io::Error,
    },
    /// 새 프로세스가 기존 프로세스보다 먼저 종료됨
    Exited {
        binary: String,
        status: String,
    },
    /// PID 파일 읽기/쓰기 실패
    PidFile {
        path: PathBuf,
        error: std::io::Error,
    },
    /// 방화벽 규칙 적용 실패
    Firewall {
        action: &'static str,
        reason: String,
    },
    /// 프록시 컨테이너 조회 실패
    Docker(DockerError),
}

impl fmt::Display for ReloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadError::Launch { binary, error } =>
                write!(f, "프록시 {} 실행 실패: {}", binary, error),
            ReloadError::Exited { binary, status } =>
                write!(f, "새 프록시 {} 프로세스가 종료됨: {}", binary, status),
            ReloadError::PidFile { path, error } =>
                write!(f, "PID 파일 {} 처리 실패: {}", path.display(), error),
            ReloadError::Firewall { action, reason } =>
                write!(f, "방화벽 {} 실패: {}", action, reason),
            ReloadError::Docker(e) =>
                write!(f, "프록시 컨테이너 처리 실패: {}", e),
        }
    }
}

impl std::error::Error for ReloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReloadError::Launch { error, .. } | ReloadError::PidFile { error, .. } => Some(error),
            ReloadError::Docker(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DockerError> for ReloadError {
    fn from(err: DockerError) -> Self {
        ReloadError::Docker(err)
    }
}
