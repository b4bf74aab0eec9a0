use std::fmt;
use crate::docker::DockerError;

/// 라우팅 모델 생성 중 발생하는 에러
#[derive(Debug)]
pub enum RoutingError {
    /// 컨테이너 스냅샷 조회 실패. 이번 사이클 전체가 중단됨
    Snapshot {
        source: DockerError,
    },
    /// 라벨 값 형식 오류
    InvalidLabel {
        container: String,
        label: String,
        value: String,
        reason: String,
    },
    /// 백엔드 주소를 결정할 수 없음
    AddressUnresolved {
        container: String,
        reason: String,
    },
    /// 오버레이 네트워크에서 컨테이너를 찾지 못함
    NetworkAttachment {
        container: String,
        network: String,
    },
    /// 다중 값 라벨 패턴 생성 실패
    LabelPattern {
        pattern: String,
        reason: String,
    },
}

impl RoutingError {
    pub(crate) fn invalid_label(container: &str, label: &str, value: &str, reason: impl Into<String>) -> Self {
        RoutingError::InvalidLabel {
            container: container.to_string(),
            label: label.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::Snapshot { source } =>
                write!(f, "컨테이너 스냅샷 조회 실패: {}", source),
            RoutingError::InvalidLabel { container, label, value, reason } =>
                write!(f, "컨테이너 {}의 라벨 {}={} 오류: {}", container, label, value, reason),
            RoutingError::AddressUnresolved { container, reason } =>
                write!(f, "컨테이너 {}의 백엔드 주소를 결정할 수 없음: {}", container, reason),
            RoutingError::NetworkAttachment { container, network } =>
                write!(f, "네트워크 {}에서 컨테이너 {}를 찾을 수 없음", network, container),
            RoutingError::LabelPattern { pattern, reason } =>
                write!(f, "라벨 패턴 {} 생성 실패: {}", pattern, reason),
        }
    }
}

impl std::error::Error for RoutingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RoutingError::Snapshot { source } => Some(source),
            _ => None,
        }
    }
}

impl From<DockerError> for RoutingError {
    fn from(err: DockerError) -> Self {
        RoutingError::Snapshot { source: err }
    }
}
