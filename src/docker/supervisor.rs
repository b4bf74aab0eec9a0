//! 이벤트 스트림 연결 관리.
//!
//! `Disconnected → Connecting → Listening → Reconnecting → Connecting` 순서로 동작합니다.
//! 재연결은 고정 간격으로 무기한 다이얼을 시도하며, 연결될 때마다 `EngineStart`를 내보내
//! 끊긴 동안 놓친 이벤트와 상관없이 전체 재구성이 일어나도록 합니다.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use bollard::system::EventsOptions;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{DockerClient, DockerError, ProxyEvent};

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Listening,
    Reconnecting,
}

/// 재연결 시 다이얼할 대상
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl Endpoint {
    pub fn parse(endpoint: &str) -> Result<Self, DockerError> {
        let url = Url::parse(endpoint).map_err(|e| DockerError::EndpointError {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "unix" => Ok(Endpoint::Unix(PathBuf::from(url.path()))),
            scheme @ ("tcp" | "http" | "https") => {
                let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(|| DockerError::EndpointError {
                    endpoint: endpoint.to_string(),
                    reason: "호스트가 없습니다".to_string(),
                })?;
                let port = url
                    .port()
                    .or_else(|| explicit_port(endpoint))
                    .unwrap_or(if scheme == "https" { 2376 } else { 2375 });
                Ok(Endpoint::Tcp(format!("{}:{}", host, port)))
            }
            scheme => Err(DockerError::EndpointError {
                endpoint: endpoint.to_string(),
                reason: format!("지원하지 않는 스킴: {}", scheme),
            }),
        }
    }

    /// 원시 연결만 시도하고 바로 닫습니다.
    pub async fn dial(&self) -> Result<(), DockerError> {
        match self {
            Endpoint::Tcp(addr) => tokio::net::TcpStream::connect(addr)
                .await
                .map(drop)
                .map_err(|e| DockerError::DialError { target: addr.clone(), error: e }),
            #[cfg(unix)]
            Endpoint::Unix(path) => tokio::net::UnixStream::connect(path)
                .await
                .map(drop)
                .map_err(|e| DockerError::DialError {
                    target: path.display().to_string(),
                    error: e,
                }),
            #[cfg(not(unix))]
            Endpoint::Unix(path) => Err(DockerError::DialError {
                target: path.display().to_string(),
                error: std::io::Error::new(std::io::ErrorKind::Unsupported, "unix socket"),
            }),
        }
    }
}

/// `http://host:80`처럼 스킴 기본값과 같은 포트는 `Url::port()`가 지워버리므로 원문에서 다시 읽습니다.
fn explicit_port(endpoint: &str) -> Option<u16> {
    let (_, rest) = endpoint.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let (host, port) = authority.rsplit_once(':')?;
    if host.starts_with('[') && !host.ends_with(']') {
        return None;
    }
    port.parse().ok()
}

enum Step {
    Next(SupervisorState),
    Shutdown,
}

pub struct ConnectionSupervisor {
    client: Arc<dyn DockerClient>,
    endpoint: Endpoint,
    reconnect_interval: Duration,
    state_tx: watch::Sender<SupervisorState>,
}

impl ConnectionSupervisor {
    pub fn new(client: Arc<dyn DockerClient>, endpoint: Endpoint, reconnect_interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Disconnected);
        Self {
            client,
            endpoint,
            reconnect_interval,
            state_tx,
        }
    }

    /// 현재 상태 구독
    pub fn state(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    fn create_event_filters() -> HashMap<String, Vec<String>> {
        HashMap::from([("type".to_string(), vec!["container".to_string()])])
    }

    /// shutdown 채널이 true가 될 때까지 이벤트를 전달합니다. 종료 시 `EngineStop`을 보냅니다.
    pub async fn run(&self, tx: mpsc::Sender<ProxyEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut state = SupervisorState::Connecting;

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.state_tx.send_replace(state);

            let step = match state {
                SupervisorState::Disconnected | SupervisorState::Connecting => {
                    self.connect(&tx, &mut shutdown).await
                }
                SupervisorState::Listening => self.listen(&tx, &mut shutdown).await,
                SupervisorState::Reconnecting => self.redial(&mut shutdown).await,
            };

            match step {
                Step::Next(next) => state = next,
                Step::Shutdown => break,
            }
        }

        self.state_tx.send_replace(SupervisorState::Disconnected);
        if tx.send(ProxyEvent::EngineStop).await.is_err() {
            debug!("이벤트 수신자가 이미 종료됨");
        }
        info!("Docker 이벤트 감시 종료");
    }

    async fn connect(&self, tx: &mpsc::Sender<ProxyEvent>, shutdown: &mut watch::Receiver<bool>) -> Step {
        let result = tokio::select! {
            result = self.client.ping() => result,
            _ = shutdown.changed() => return Step::Shutdown,
        };

        match result {
            Ok(()) => {
                info!(endpoint = ?self.endpoint, "Docker 엔진 연결됨");
                if tx.send(ProxyEvent::EngineStart).await.is_err() {
                    return Step::Shutdown;
                }
                Step::Next(SupervisorState::Listening)
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?self.reconnect_interval, "Docker 엔진 연결 실패");
                // ping 실패도 다이얼 실패와 같은 간격으로 대기
                tokio::select! {
                    _ = sleep(self.reconnect_interval) => Step::Next(SupervisorState::Reconnecting),
                    _ = shutdown.changed() => Step::Shutdown,
                }
            }
        }
    }

    async fn listen(&self, tx: &mpsc::Sender<ProxyEvent>, shutdown: &mut watch::Receiver<bool>) -> Step {
        let options = EventsOptions {
            filters: Self::create_event_filters(),
            ..Default::default()
        };
        let mut events = self.client.events(Some(options));

        loop {
            let next = tokio::select! {
                next = events.next() => next,
                _ = shutdown.changed() => return Step::Shutdown,
            };

            match next {
                Some(Ok(message)) => {
                    let Some(event) = ProxyEvent::from_message(&message) else { continue };
                    debug!(event = %event.name(), "Docker 이벤트 수신");
                    if tx.send(event).await.is_err() {
                        return Step::Shutdown;
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "Docker 이벤트 스트림 오류");
                    return Step::Next(SupervisorState::Reconnecting);
                }
                None => {
                    warn!("Docker 이벤트 스트림 종료");
                    return Step::Next(SupervisorState::Reconnecting);
                }
            }
        }
    }

    async fn redial(&self, shutdown: &mut watch::Receiver<bool>) -> Step {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            match self.endpoint.dial().await {
                Ok(()) => {
                    info!(endpoint = ?self.endpoint, attempts, "Docker 엔드포인트 다이얼 성공");
                    return Step::Next(SupervisorState::Connecting);
                }
                Err(e) => {
                    debug!(error = %e, attempts, "Docker 엔드포인트 다이얼 실패");
                }
            }

            tokio::select! {
                _ = sleep(self.reconnect_interval) => {}
                _ = shutdown.changed() => return Step::Shutdown,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(
            Endpoint::parse("unix:///var/run/docker.sock").unwrap(),
            Endpoint::Unix(PathBuf::from("/var/run/docker.sock"))
        );
        assert_eq!(
            Endpoint::parse("tcp://10.0.0.1:2375").unwrap(),
            Endpoint::Tcp("10.0.0.1:2375".to_string())
        );
        assert_eq!(
            Endpoint::parse("https://docker.internal").unwrap(),
            Endpoint::Tcp("docker.internal:2376".to_string())
        );
        assert_eq!(
            Endpoint::parse("http://docker.internal:80").unwrap(),
            Endpoint::Tcp("docker.internal:80".to_string())
        );
        assert_eq!(
            Endpoint::parse("https://docker.internal:443/v1.43").unwrap(),
            Endpoint::Tcp("docker.internal:443".to_string())
        );
        assert_eq!(
            Endpoint::parse("http://[::1]").unwrap(),
            Endpoint::Tcp("[::1]:2375".to_string())
        );
        assert!(Endpoint::parse("ftp://host").is_err());
    }

    #[tokio::test]
    async fn test_dial_reports_refused_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::Tcp(addr.to_string());
        assert!(matches!(endpoint.dial().await, Err(DockerError::DialError { .. })));
    }
}
