use std::pin::Pin;
use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, KillContainerOptions, ListContainersOptions, RestartContainerOptions,
};
use bollard::models::{ContainerInspectResponse, ContainerSummary, EventMessage, Network};
use bollard::network::InspectNetworkOptions;
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::{Stream, StreamExt};
use tracing::info;

use super::DockerError;
use crate::settings::DockerSettings;

/// 이벤트 스트림 타입
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventMessage, DockerError>> + Send>>;

/// 코어가 사용하는 Docker API 부분 집합. 테스트에서는 목 구현으로 대체합니다.
#[async_trait]
pub trait DockerClient: Send + Sync {
    async fn ping(&self) -> Result<(), DockerError>;

    async fn list_containers(
        &self,
        options: Option<ListContainersOptions<String>>,
    ) -> Result<Vec<ContainerSummary>, DockerError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError>;

    async fn inspect_network(&self, name: &str) -> Result<Network, DockerError>;

    async fn kill_container(&self, id: &str, signal: &str) -> Result<(), DockerError>;

    async fn restart_container(&self, id: &str, timeout_secs: isize) -> Result<(), DockerError>;

    fn events(&self, options: Option<EventsOptions<String>>) -> EventStream;
}

// 실제 Docker 클라이언트 구현
#[derive(Clone)]
pub struct BollardDockerClient(Docker);

const CLIENT_TIMEOUT_SECS: u64 = 120;

impl BollardDockerClient {
    pub fn new(docker: Docker) -> Self {
        Self(docker)
    }

    /// 설정된 엔드포인트로 클라이언트를 만듭니다. 실제 연결은 첫 요청 때 이루어집니다.
    pub fn connect(settings: &DockerSettings) -> Result<Self, DockerError> {
        let endpoint = settings.endpoint.as_str();
        let docker = if let Some(path) = endpoint.strip_prefix("unix://") {
            Docker::connect_with_unix(path, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
        } else if let Some(tls) = &settings.tls {
            Docker::connect_with_ssl(
                endpoint,
                &tls.key_path,
                &tls.cert_path,
                &tls.ca_path,
                CLIENT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )?
        } else if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") {
            Docker::connect_with_http(endpoint, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
        } else {
            return Err(DockerError::EndpointError {
                endpoint: endpoint.to_string(),
                reason: "https 엔드포인트에는 TLS 설정이 필요합니다".to_string(),
            });
        };

        info!(endpoint = %endpoint, tls = settings.tls.is_some(), "Docker 클라이언트 생성");
        Ok(Self(docker))
    }
}

#[async_trait]
impl DockerClient for BollardDockerClient {
    async fn ping(&self) -> Result<(), DockerError> {
        self.0.ping().await.map(|_| ()).map_err(|e| DockerError::ConnectionError {
            source: e,
            context: "ping".to_string(),
        })
    }

    async fn list_containers(
        &self,
        options: Option<ListContainersOptions<String>>,
    ) -> Result<Vec<ContainerSummary>, DockerError> {
        self.0.list_containers(options).await.map_err(|e| DockerError::ListContainersError {
            source: e,
            context: "실행 중인 컨테이너 조회".to_string(),
        })
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError> {
        self.0
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| DockerError::InspectError {
                target: format!("컨테이너 {}", id),
                source: e,
            })
    }

    async fn inspect_network(&self, name: &str) -> Result<Network, DockerError> {
        self.0
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|e| DockerError::InspectError {
                target: format!("네트워크 {}", name),
                source: e,
            })
    }

    async fn kill_container(&self, id: &str, signal: &str) -> Result<(), DockerError> {
        self.0
            .kill_container(id, Some(KillContainerOptions { signal: signal.to_string() }))
            .await
            .map_err(|e| DockerError::ContainerActionError {
                container_id: id.to_string(),
                action: format!("시그널 {}", signal),
                source: e,
            })
    }

    async fn restart_container(&self, id: &str, timeout_secs: isize) -> Result<(), DockerError> {
        self.0
            .restart_container(id, Some(RestartContainerOptions { t: timeout_secs }))
            .await
            .map_err(|e| DockerError::ContainerActionError {
                container_id: id.to_string(),
                action: "재시작".to_string(),
                source: e,
            })
    }

    fn events(&self, options: Option<EventsOptions<String>>) -> EventStream {
        Box::pin(self.0.events(options).map(|event| {
            event.map_err(|e| DockerError::ConnectionError {
                source: e,
                context: "Docker 이벤트 구독".to_string(),
            })
        }))
    }
}
