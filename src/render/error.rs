use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RenderError {
    /// 설정 파일 구조를 깨뜨릴 수 있는 값
    UnsafeValue {
        field: String,
        value: String,
    },
    /// 백엔드가 지원하지 않는 분산 알고리즘
    UnsupportedBalance {
        backend: &'static str,
        domain: String,
        algorithm: String,
    },
    /// SSL 호스트에 사용할 인증서가 없음
    MissingCertificate {
        domain: String,
    },
    /// 버퍼 출력 실패
    Format(fmt::Error),
    /// 설정 파일 기록 실패
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl RenderError {
    pub(crate) fn unsafe_value(field: &str, value: &str) -> Self {
        RenderError::UnsafeValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::UnsafeValue { field, value } =>
                write!(f, "{} 값에 허용되지 않는 문자가 있음: {:?}", field, value),
            RenderError::UnsupportedBalance { backend, domain, algorithm } =>
                write!(f, "{}에서 지원하지 않는 분산 알고리즘 {} (도메인 {})", backend, algorithm, domain),
            RenderError::MissingCertificate { domain } =>
                write!(f, "SSL 도메인 {}에 사용할 인증서가 없음", domain),
            RenderError::Format(e) =>
                write!(f, "설정 렌더링 실패: {}", e),
            RenderError::Io { path, error } =>
                write!(f, "설정 파일 {} 기록 실패: {}", path.display(), error),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Io { error, .. } => Some(error),
            RenderError::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl From<fmt::Error> for RenderError {
    fn from(err: fmt::Error) -> Self {
        RenderError::Format(err)
    }
}
