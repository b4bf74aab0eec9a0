use std::fmt;

#[derive(Debug)]
pub enum DockerError {
    /// Docker 데몬 연결 실패
    ConnectionError {
        source: bollard::errors::Error,
        context: String,
    },
    /// 컨테이너 목록 조회 실패
    ListContainersError {
        source: bollard::errors::Error,
        context: String,
    },
    /// 컨테이너/네트워크 조회 실패
    InspectError {
        target: String,
        source: bollard::errors::Error,
    },
    /// 시그널 전송/재시작 실패
    ContainerActionError {
        container_id: String,
        action: String,
        source: bollard::errors::Error,
    },
    /// 컨테이너 설정(라벨) 오류
    ContainerConfigError {
        container_id: String,
        reason: String,
        context: Option<String>,
    },
    /// 네트워크 설정 오류
    NetworkError {
        container_id: String,
        network: String,
        reason: String,
        context: Option<String>,
    },
    /// 엔드포인트 주소 오류
    EndpointError {
        endpoint: String,
        reason: String,
    },
    /// 재연결 다이얼 실패
    DialError {
        target: String,
        error: std::io::Error,
    },
}

impl DockerError {
    /// 잠시 후 다시 시도하면 성공할 수 있는 오류인지
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DockerError::ConnectionError { .. }
                | DockerError::ListContainersError { .. }
                | DockerError::InspectError { .. }
                | DockerError::DialError { .. }
        )
    }

    pub(crate) fn config(container_id: &str, reason: impl Into<String>) -> Self {
        DockerError::ContainerConfigError {
            container_id: container_id.to_string(),
            reason: reason.into(),
            context: None,
        }
    }
}

impl fmt::Display for DockerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerError::ConnectionError { source, context } =>
                write!(f, "Docker 데몬 연결 실패 ({}): {}", context, source),
            DockerError::ListContainersError { source, context } =>
                write!(f, "컨테이너 목록 조회 실패 ({}): {}", context, source),
            DockerError::InspectError { target, source } =>
                write!(f, "{} 조회 실패: {}", target, source),
            DockerError::ContainerActionError { container_id, action, source } =>
                write!(f, "컨테이너 {} {} 실패: {}", container_id, action, source),
            DockerError::ContainerConfigError { container_id, reason, context } =>
                if let Some(ctx) = context {
                    write!(f, "컨테이너 {} 설정 오류 ({}): {}", container_id, ctx, reason)
                } else {
                    write!(f, "컨테이너 {} 설정 오류: {}", container_id, reason)
                },
            DockerError::NetworkError { container_id, network, reason, context } =>
                write!(f, "컨테이너 {}의 네트워크 {} 설정 오류 ({}): {}",
                    container_id, network, context.as_deref().unwrap_or("No context provided"), reason),
            DockerError::EndpointError { endpoint, reason } =>
                write!(f, "Docker 엔드포인트 {} 오류: {}", endpoint, reason),
            DockerError::DialError { target, error } =>
                write!(f, "{} 다이얼 실패: {}", target, error),
        }
    }
}

impl std::error::Error for DockerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DockerError::ConnectionError { source, .. }
            | DockerError::ListContainersError { source, .. }
            | DockerError::InspectError { source, .. }
            | DockerError::ContainerActionError { source, .. } => Some(source),
            DockerError::DialError { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<bollard::errors::Error> for DockerError {
    fn from(err: bollard::errors::Error) -> Self {
        DockerError::ConnectionError {
            source: err,
            context: "Docker 데몬 연결 실패".to_string(),
        }
    }
}
