use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::Network;
use tracing::{debug, info, warn};

use super::{
    ContainerDescriptor, LabelKey, LabelSource, RoutingError, RoutingModel, SslVerify, UpstreamServer,
    VirtualHost,
};
use crate::docker::{with_retry, DockerClient, DockerError, RetryPolicy, RetryableOperation};
use crate::settings::{BackendKind, ExtensionConfig};

pub const DEFAULT_BALANCE_ALGORITHM: &str = "roundrobin";
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 10_000;

/// 실행 중인 컨테이너 목록과 inspect 결과를 한 번에 가져오는 작업
struct SnapshotFetch<'a> {
    client: &'a dyn DockerClient,
}

#[async_trait]
impl<'a> RetryableOperation for SnapshotFetch<'a> {
    type Output = Vec<ContainerDescriptor>;

    fn describe(&self) -> &'static str {
        "컨테이너 스냅샷 조회"
    }

    async fn execute(&self) -> Result<Self::Output, DockerError> {
        let containers = self
            .client
            .list_containers(Some(ListContainersOptions::<String>::default()))
            .await?;

        let mut descriptors = Vec::with_capacity(containers.len());
        for summary in containers {
            let Some(id) = summary.id else { continue };

            let response = match self.client.inspect_container(&id).await {
                Ok(response) => response,
                // 목록 조회와 inspect 사이에 사라진 컨테이너
                Err(DockerError::InspectError {
                    source: bollard::errors::Error::DockerResponseServerError { status_code: 404, .. },
                    ..
                }) => {
                    debug!(container_id = %id, "inspect 전에 컨테이너가 제거됨");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match ContainerDescriptor::from_inspect(response) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => warn!(container_id = %id, error = %e, "컨테이너 정보 해석 실패, 건너뜀"),
            }
        }

        Ok(descriptors)
    }
}

/// 컨테이너 하나에서 얻은 라우팅 정보
struct ContainerRoute {
    primary: String,
    aliases: Vec<String>,
    template: VirtualHost,
    upstream: UpstreamServer,
}

/// 현재 컨테이너 스냅샷으로 라우팅 모델 전체를 다시 만듭니다.
pub struct RoutingModelBuilder {
    client: Arc<dyn DockerClient>,
    labels: Arc<dyn LabelSource>,
    extension: Arc<ExtensionConfig>,
    /// 호스트 IP가 비어 있거나 0.0.0.0인 바인딩에 사용할 주소
    engine_host: String,
    retry: RetryPolicy,
}

impl RoutingModelBuilder {
    pub fn new(
        client: Arc<dyn DockerClient>,
        labels: Arc<dyn LabelSource>,
        extension: Arc<ExtensionConfig>,
        engine_host: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            labels,
            extension,
            engine_host: engine_host.into(),
            retry,
        }
    }

    pub async fn build(&self) -> Result<RoutingModel, RoutingError> {
        let fetch = SnapshotFetch { client: self.client.as_ref() };
        let descriptors = with_retry(fetch, self.retry.clone()).await?;
        let networks = self.fetch_networks(&descriptors).await;

        let model = self.assemble(&descriptors, &networks);
        info!(
            containers = descriptors.len(),
            hosts = model.hosts.len(),
            upstreams = model.upstream_count(),
            "라우팅 모델 생성 완료"
        );
        Ok(model)
    }

    /// 라벨로 지정된 네트워크만 조회합니다. 결과는 이번 사이클 안에서만 재사용합니다.
    async fn fetch_networks(&self, descriptors: &[ContainerDescriptor]) -> HashMap<String, Network> {
        let mut networks = HashMap::new();
        let mut attempted = HashSet::new();

        for descriptor in descriptors {
            let Some(name) = self.labels.get(descriptor, LabelKey::Network) else { continue };
            if !attempted.insert(name.clone()) {
                continue;
            }
            match self.client.inspect_network(&name).await {
                Ok(network) => {
                    networks.insert(name, network);
                }
                Err(e) => warn!(network = %name, error = %e, "네트워크 조회 실패"),
            }
        }

        networks
    }

    /// 스냅샷 → 모델. 부수 효과가 없으며 같은 입력에는 같은 모델을 돌려줍니다.
    pub fn assemble(
        &self,
        descriptors: &[ContainerDescriptor],
        networks: &HashMap<String, Network>,
    ) -> RoutingModel {
        let mut hosts: BTreeMap<String, VirtualHost> = BTreeMap::new();

        for descriptor in descriptors {
            let route = match self.resolve(descriptor, networks) {
                Ok(Some(route)) => route,
                Ok(None) => continue,
                Err(e) => {
                    warn!(container = %descriptor.name, error = %e, "컨테이너 건너뜀");
                    continue;
                }
            };

            let keys = std::iter::once(&route.primary).chain(route.aliases.iter());
            for key in keys {
                match hosts.get_mut(key) {
                    Some(existing) => {
                        if existing.health_check != route.template.health_check {
                            warn!(
                                domain = %key,
                                container = %descriptor.name,
                                kept = ?existing.health_check,
                                discarded = ?route.template.health_check,
                                "헬스체크 설정 충돌, 먼저 등록된 값을 유지"
                            );
                        }
                        if !existing.upstreams.contains(&route.upstream) {
                            existing.upstreams.push(route.upstream.clone());
                        }
                    }
                    None => {
                        let mut host = route.template.clone();
                        host.domain = key.clone();
                        host.server_names = vec![key.clone()];
                        host.upstreams = vec![route.upstream.clone()];
                        hosts.insert(key.clone(), host);
                    }
                }
            }
        }

        RoutingModel {
            hosts: hosts.into_values().collect(),
            extension: self.extension.clone(),
        }
    }

    fn resolve(
        &self,
        container: &ContainerDescriptor,
        networks: &HashMap<String, Network>,
    ) -> Result<Option<ContainerRoute>, RoutingError> {
        let labels = self.labels.as_ref();

        if labels.get(container, LabelKey::ExtName).is_some() {
            debug!(container = %container.name, "관리 대상 프록시 컨테이너, 건너뜀");
            return Ok(None);
        }
        if !container.has_ports() {
            debug!(container = %container.name, "노출된 포트 없음, 건너뜀");
            return Ok(None);
        }

        let hostname = labels
            .get(container, LabelKey::Hostname)
            .unwrap_or_else(|| container.hostname.clone());
        let domain = labels
            .get(container, LabelKey::Domain)
            .unwrap_or_else(|| container.domainname.clone());
        if domain.is_empty() {
            debug!(container = %container.name, "도메인 없음, 건너뜀");
            return Ok(None);
        }
        let primary = domain_key(&hostname, &domain);

        let check_interval_ms = match labels.get(container, LabelKey::HealthCheckInterval) {
            Some(value) => value.parse::<u64>().map_err(|e| {
                RoutingError::invalid_label(
                    &container.name,
                    &labels.qualified(LabelKey::HealthCheckInterval),
                    &value,
                    e.to_string(),
                )
            })?,
            None => DEFAULT_CHECK_INTERVAL_MS,
        };

        let ssl_backend_verify = match labels.get(container, LabelKey::SslBackendVerify) {
            Some(value) => value.parse::<SslVerify>().map_err(|e| {
                RoutingError::invalid_label(
                    &container.name,
                    &labels.qualified(LabelKey::SslBackendVerify),
                    &value,
                    e,
                )
            })?,
            None => SslVerify::default(),
        };

        let upstream = UpstreamServer {
            address: self.resolve_address(container, networks)?,
            container_name: container.name.clone(),
            check_interval_ms,
        };

        let cert_dir = self.extension.ssl_cert_dir.as_path();
        let nginx = self.extension.kind == BackendKind::Nginx;

        let template = VirtualHost {
            domain: primary.clone(),
            server_names: vec![primary.clone()],
            ssl: flag(labels.get(container, LabelKey::Ssl)),
            ssl_only: flag(labels.get(container, LabelKey::SslOnly)),
            ssl_backend: flag(labels.get(container, LabelKey::SslBackend)),
            ssl_backend_verify,
            ssl_cert: labels.get(container, LabelKey::SslCert).map(|f| cert_dir.join(f)),
            ssl_cert_key: labels.get(container, LabelKey::SslCertKey).map(|f| cert_dir.join(f)),
            balance_algorithm: labels
                .get(container, LabelKey::BalanceAlgorithm)
                .unwrap_or_else(|| DEFAULT_BALANCE_ALGORITHM.to_string()),
            health_check: labels.get(container, LabelKey::HealthCheck),
            health_check_interval_ms: check_interval_ms,
            backend_options: sorted(labels.get_all(container, LabelKey::BackendOption)),
            websocket_endpoints: sorted(labels.get_all(container, LabelKey::WebsocketEndpoint)),
            context_root: labels.get(container, LabelKey::ContextRoot).filter(|_| nginx),
            context_root_rewrite: nginx && flag(labels.get(container, LabelKey::ContextRootRewrite)),
            upstreams: Vec::new(),
        };

        let aliases = sorted(labels.get_all(container, LabelKey::AliasDomain))
            .into_iter()
            .filter(|alias| alias != &primary)
            .collect();

        Ok(Some(ContainerRoute {
            primary,
            aliases,
            template,
            upstream,
        }))
    }

    fn resolve_address(
        &self,
        container: &ContainerDescriptor,
        networks: &HashMap<String, Network>,
    ) -> Result<String, RoutingError> {
        let labels = self.labels.as_ref();
        let port_override = match labels.get(container, LabelKey::Port) {
            Some(value) => Some(value.parse::<u16>().map_err(|e| {
                RoutingError::invalid_label(&container.name, &labels.qualified(LabelKey::Port), &value, e.to_string())
            })?),
            None => None,
        };

        let internal = container.internal_ports();
        let internal_port = || {
            port_override
                .filter(|port| internal.contains(port))
                .or_else(|| internal.iter().next().copied())
                .ok_or_else(|| RoutingError::AddressUnresolved {
                    container: container.name.clone(),
                    reason: "내부 포트 없음".to_string(),
                })
        };

        let (host, port) = if let Some(network) = labels.get(container, LabelKey::Network) {
            let ip = networks
                .get(&network)
                .and_then(|n| n.containers.as_ref())
                .and_then(|attached| attached.get(&container.id))
                .and_then(|attachment| attachment.ipv4_address.clone())
                .or_else(|| container.networks.get(&network).cloned())
                .ok_or_else(|| RoutingError::NetworkAttachment {
                    container: container.name.clone(),
                    network: network.clone(),
                })?;
            (strip_cidr(&ip).to_string(), internal_port()?)
        } else if let Some((container_port, bindings)) = port_override
            .and_then(|port| container.published.get_key_value(&port))
            .or_else(|| container.published.iter().next())
        {
            let binding = bindings.first().ok_or_else(|| RoutingError::AddressUnresolved {
                container: container.name.clone(),
                reason: format!("포트 {}의 바인딩 없음", container_port),
            })?;
            let host = match binding.host_ip.as_str() {
                "" | "0.0.0.0" | "::" => self.engine_host.clone(),
                ip => ip.to_string(),
            };
            (host, binding.host_port)
        } else {
            // 게시된 포트가 없으면 첫 번째 네트워크 주소로 직접 연결
            let (_, ip) = container.networks.iter().next().ok_or_else(|| RoutingError::AddressUnresolved {
                container: container.name.clone(),
                reason: "게시된 포트와 네트워크 주소가 모두 없음".to_string(),
            })?;
            (ip.clone(), internal_port()?)
        };

        let host = self.extension.backend_override_address.clone().unwrap_or(host);
        Ok(format!("{}:{}", host, port))
    }
}

/// hostname이 비어 있지 않고 domain과 다르면 `hostname.domain`, 아니면 domain
pub fn domain_key(hostname: &str, domain: &str) -> String {
    if !hostname.is_empty() && hostname != domain {
        format!("{}.{}", hostname, domain)
    } else {
        domain.to_string()
    }
}

fn strip_cidr(address: &str) -> &str {
    address.split('/').next().unwrap_or(address)
}

fn flag(value: Option<String>) -> bool {
    value.is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
}

fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_key() {
        assert_eq!(domain_key("web", "example.com"), "web.example.com");
        assert_eq!(domain_key("", "example.com"), "example.com");
        assert_eq!(domain_key("example.com", "example.com"), "example.com");
    }

    #[test]
    fn test_strip_cidr() {
        assert_eq!(strip_cidr("10.0.0.5/24"), "10.0.0.5");
        assert_eq!(strip_cidr("10.0.0.5"), "10.0.0.5");
    }

    #[test]
    fn test_flag_values() {
        assert!(flag(Some("true".to_string())));
        assert!(flag(Some("1".to_string())));
        assert!(!flag(Some("false".to_string())));
        assert!(!flag(None));
    }
}
