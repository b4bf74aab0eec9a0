use std::collections::{BTreeMap, BTreeSet, HashMap};
use bollard::models::ContainerInspectResponse;
use crate::docker::DockerError;

/// 호스트에 게시된 포트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    pub host_ip: String,
    pub host_port: u16,
}

/// 한 사이클 동안만 사용하는 컨테이너 스냅샷
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerDescriptor {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub domainname: String,
    pub labels: HashMap<String, String>,
    pub env: HashMap<String, String>,
    /// 컨테이너 내부 포트 (Config.ExposedPorts)
    pub exposed_ports: BTreeSet<u16>,
    /// 컨테이너 포트 → 호스트 바인딩
    pub published: BTreeMap<u16, Vec<PublishedPort>>,
    /// 네트워크 이름 → IP
    pub networks: BTreeMap<String, String>,
}

impl ContainerDescriptor {
    pub fn from_inspect(response: ContainerInspectResponse) -> Result<Self, DockerError> {
        let id = response
            .id
            .ok_or_else(|| DockerError::config("unknown", "inspect 응답에 컨테이너 ID가 없습니다"))?;
        let name = response
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| id.chars().take(12).collect());

        let mut descriptor = Self {
            id,
            name,
            ..Default::default()
        };

        if let Some(config) = response.config {
            descriptor.hostname = config.hostname.unwrap_or_default();
            descriptor.domainname = config.domainname.unwrap_or_default();
            descriptor.labels = config.labels.unwrap_or_default();
            descriptor.env = config
                .env
                .unwrap_or_default()
                .iter()
                .filter_map(|entry| entry.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            descriptor.exposed_ports = config
                .exposed_ports
                .unwrap_or_default()
                .keys()
                .filter_map(|spec| parse_port_spec(spec))
                .collect();
        }

        if let Some(network_settings) = response.network_settings {
            for (spec, bindings) in network_settings.ports.unwrap_or_default() {
                let Some(container_port) = parse_port_spec(&spec) else { continue };
                let published: Vec<PublishedPort> = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|binding| {
                        let host_port = binding.host_port?.parse().ok()?;
                        Some(PublishedPort {
                            host_ip: binding.host_ip.unwrap_or_default(),
                            host_port,
                        })
                    })
                    .collect();
                if !published.is_empty() {
                    descriptor.published.insert(container_port, published);
                }
            }

            descriptor.networks = network_settings
                .networks
                .unwrap_or_default()
                .into_iter()
                .filter_map(|(name, endpoint)| {
                    endpoint.ip_address.filter(|ip| !ip.is_empty()).map(|ip| (name, ip))
                })
                .collect();
        }

        Ok(descriptor)
    }

    /// 노출 포트와 게시 포트의 합집합
    pub fn internal_ports(&self) -> BTreeSet<u16> {
        self.exposed_ports
            .iter()
            .chain(self.published.keys())
            .copied()
            .collect()
    }

    pub fn has_ports(&self) -> bool {
        !self.exposed_ports.is_empty() || !self.published.is_empty()
    }
}

/// `"80/tcp"` 형태의 포트 표기에서 번호만 추출
fn parse_port_spec(spec: &str) -> Option<u16> {
    spec.split('/').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, EndpointSettings, NetworkSettings, PortBinding};

    #[test]
    fn test_from_inspect_collects_ports_and_networks() {
        let response = ContainerInspectResponse {
            id: Some("abcdef0123456789".to_string()),
            name: Some("/web".to_string()),
            config: Some(ContainerConfig {
                hostname: Some("web".to_string()),
                domainname: Some("example.com".to_string()),
                env: Some(vec!["A=1".to_string(), "MALFORMED".to_string()]),
                exposed_ports: Some(HashMap::from([
                    ("8080/tcp".to_string(), HashMap::new()),
                    ("53/udp".to_string(), HashMap::new()),
                ])),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                ports: Some(HashMap::from([
                    ("8080/tcp".to_string(), Some(vec![PortBinding {
                        host_ip: Some("0.0.0.0".to_string()),
                        host_port: Some("32768".to_string()),
                    }])),
                    ("53/udp".to_string(), None),
                ])),
                networks: Some(HashMap::from([(
                    "bridge".to_string(),
                    EndpointSettings {
                        ip_address: Some("172.17.0.2".to_string()),
                        ..Default::default()
                    },
                )])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let descriptor = ContainerDescriptor::from_inspect(response).unwrap();
        assert_eq!(descriptor.name, "web");
        assert_eq!(descriptor.env.get("A").map(String::as_str), Some("1"));
        assert_eq!(descriptor.env.len(), 1);
        assert_eq!(descriptor.internal_ports(), BTreeSet::from([53, 8080]));
        assert_eq!(descriptor.published[&8080][0].host_port, 32768);
        assert!(!descriptor.published.contains_key(&53));
        assert_eq!(descriptor.networks.get("bridge").map(String::as_str), Some("172.17.0.2"));
    }

    #[test]
    fn test_from_inspect_requires_id() {
        assert!(ContainerDescriptor::from_inspect(ContainerInspectResponse::default()).is_err());
    }
}
