#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bollard::container::ListContainersOptions;
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerSummary, EndpointSettings, EventActor, EventMessage,
    EventMessageTypeEnum, Network, NetworkSettings, PortBinding,
};
use bollard::system::EventsOptions;
use futures_util::stream;
use reverse_proxy_sync::docker::{DockerClient, DockerError, EventStream};

fn server_error(status_code: u16) -> bollard::errors::Error {
    bollard::errors::Error::DockerResponseServerError {
        status_code,
        message: "mock".to_string(),
    }
}

/// 테스트용 Docker 클라이언트
#[derive(Default)]
pub struct MockDockerClient {
    containers: Mutex<Vec<ContainerInspectResponse>>,
    networks: Mutex<HashMap<String, Network>>,
    /// 목록에는 있지만 inspect 시 404를 돌려줄 ID
    vanished: Mutex<HashSet<String>>,
    /// 시그널/재시작이 실패할 컨테이너 ID
    failing: Mutex<HashSet<String>>,
    /// (컨테이너 ID, 동작) 기록
    actions: Mutex<Vec<(String, String)>>,
    /// 연결마다 한 번씩 내보낼 이벤트
    events: Mutex<Vec<EventMessage>>,
    failing_pings: AtomicUsize,
    pings: AtomicUsize,
    ping_times: Mutex<Vec<tokio::time::Instant>>,
    list_calls: AtomicUsize,
}

impl MockDockerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_containers(containers: Vec<ContainerInspectResponse>) -> Self {
        let client = Self::default();
        *client.containers.lock().unwrap() = containers;
        client
    }

    pub fn set_containers(&self, containers: Vec<ContainerInspectResponse>) {
        *self.containers.lock().unwrap() = containers;
    }

    pub fn add_network(&self, name: &str, network: Network) {
        self.networks.lock().unwrap().insert(name.to_string(), network);
    }

    pub fn vanish(&self, id: &str) {
        self.vanished.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_actions_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_next_pings(&self, count: usize) {
        self.failing_pings.store(count, Ordering::SeqCst);
    }

    pub fn push_event(&self, event: EventMessage) {
        self.events.lock().unwrap().push(event);
    }

    pub fn actions(&self) -> Vec<(String, String)> {
        self.actions.lock().unwrap().clone()
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn ping_times(&self) -> Vec<tokio::time::Instant> {
        self.ping_times.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn record(&self, id: &str, action: String) -> Result<(), DockerError> {
        self.actions.lock().unwrap().push((id.to_string(), action.clone()));
        if self.failing.lock().unwrap().contains(id) {
            return Err(DockerError::ContainerActionError {
                container_id: id.to_string(),
                action,
                source: server_error(500),
            });
        }
        Ok(())
    }
}

/// `label=key=value` 필터 일치 여부
fn matches_label_filter(container: &ContainerInspectResponse, filters: &HashMap<String, Vec<String>>) -> bool {
    let Some(wanted) = filters.get("label") else { return true };
    let labels = container
        .config
        .as_ref()
        .and_then(|config| config.labels.clone())
        .unwrap_or_default();

    wanted.iter().all(|filter| match filter.split_once('=') {
        Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
        None => labels.contains_key(filter),
    })
}

#[async_trait::async_trait]
impl DockerClient for MockDockerClient {
    async fn ping(&self) -> Result<(), DockerError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.ping_times.lock().unwrap().push(tokio::time::Instant::now());
        let remaining = self.failing_pings.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_pings.store(remaining - 1, Ordering::SeqCst);
            return Err(DockerError::ConnectionError {
                source: server_error(503),
                context: "ping".to_string(),
            });
        }
        Ok(())
    }

    async fn list_containers(
        &self,
        options: Option<ListContainersOptions<String>>,
    ) -> Result<Vec<ContainerSummary>, DockerError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let filters = options.map(|o| o.filters).unwrap_or_default();
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches_label_filter(c, &filters))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                ..Default::default()
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError> {
        let missing = || DockerError::InspectError {
            target: format!("컨테이너 {}", id),
            source: server_error(404),
        };
        if self.vanished.lock().unwrap().contains(id) {
            return Err(missing());
        }
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id.as_deref() == Some(id))
            .cloned()
            .ok_or_else(missing)
    }

    async fn inspect_network(&self, name: &str) -> Result<Network, DockerError> {
        self.networks
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| DockerError::InspectError {
                target: format!("네트워크 {}", name),
                source: server_error(404),
            })
    }

    async fn kill_container(&self, id: &str, signal: &str) -> Result<(), DockerError> {
        self.record(id, format!("kill:{}", signal))
    }

    async fn restart_container(&self, id: &str, timeout_secs: isize) -> Result<(), DockerError> {
        self.record(id, format!("restart:{}", timeout_secs))
    }

    fn events(&self, _options: Option<EventsOptions<String>>) -> EventStream {
        let events: Vec<_> = self.events.lock().unwrap().iter().cloned().map(Ok).collect();
        Box::pin(stream::iter(events))
    }
}

/// 테스트 컨테이너 빌더
pub struct ContainerBuilder {
    response: ContainerInspectResponse,
}

impl ContainerBuilder {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            response: ContainerInspectResponse {
                id: Some(id.to_string()),
                name: Some(format!("/{}", name)),
                config: Some(ContainerConfig {
                    labels: Some(HashMap::new()),
                    ..Default::default()
                }),
                network_settings: Some(NetworkSettings {
                    ports: Some(HashMap::new()),
                    networks: Some(HashMap::new()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }

    fn config(&mut self) -> &mut ContainerConfig {
        self.response.config.get_or_insert_with(Default::default)
    }

    fn network_settings(&mut self) -> &mut NetworkSettings {
        self.response.network_settings.get_or_insert_with(Default::default)
    }

    pub fn hostname(mut self, hostname: &str, domainname: &str) -> Self {
        let config = self.config();
        config.hostname = Some(hostname.to_string());
        config.domainname = Some(domainname.to_string());
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.config()
            .labels
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config()
            .env
            .get_or_insert_with(Vec::new)
            .push(format!("{}={}", key, value));
        self
    }

    pub fn expose(mut self, port: u16) -> Self {
        self.config()
            .exposed_ports
            .get_or_insert_with(HashMap::new)
            .insert(format!("{}/tcp", port), HashMap::new());
        self
    }

    pub fn publish(mut self, container_port: u16, host_ip: &str, host_port: u16) -> Self {
        let binding = PortBinding {
            host_ip: Some(host_ip.to_string()),
            host_port: Some(host_port.to_string()),
        };
        self.network_settings()
            .ports
            .get_or_insert_with(HashMap::new)
            .entry(format!("{}/tcp", container_port))
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(binding);
        self
    }

    pub fn network(mut self, name: &str, ip: &str) -> Self {
        self.network_settings()
            .networks
            .get_or_insert_with(HashMap::new)
            .insert(
                name.to_string(),
                EndpointSettings {
                    ip_address: Some(ip.to_string()),
                    ..Default::default()
                },
            );
        self
    }

    pub fn build(self) -> ContainerInspectResponse {
        self.response
    }
}

pub fn container_event(id: &str, action: &str) -> EventMessage {
    EventMessage {
        typ: Some(EventMessageTypeEnum::CONTAINER),
        action: Some(action.to_string()),
        actor: Some(EventActor {
            id: Some(id.to_string()),
            attributes: Some(HashMap::new()),
        }),
        ..Default::default()
    }
}
