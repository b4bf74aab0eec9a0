//! 컨테이너 메타데이터에서 라우팅 설정을 읽는 전략.
//!
//! 라벨 방식(`rproxy.hostname`)과 레거시 환경 변수 방식(`RPROXY_HOSTNAME`)이 같은 어휘를 공유합니다.
//! 다중 값은 `key`, `key.0`, `key.web` 처럼 같은 접두사를 가진 항목의 집합이며 순서는 보장하지 않습니다.

use std::collections::HashMap;
use regex_lite::Regex;

use super::{ContainerDescriptor, RoutingError};

/// 라우팅 라벨 어휘
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKey {
    Hostname,
    Domain,
    Ssl,
    SslOnly,
    SslBackend,
    SslBackendVerify,
    SslCert,
    SslCertKey,
    Port,
    WebsocketEndpoint,
    AliasDomain,
    HealthCheck,
    HealthCheckInterval,
    BalanceAlgorithm,
    BackendOption,
    Network,
    ContextRoot,
    ContextRootRewrite,
    /// 관리 대상 프록시 컨테이너 표시
    ExtName,
}

impl LabelKey {
    pub const MULTI_VALUED: [LabelKey; 3] = [
        LabelKey::WebsocketEndpoint,
        LabelKey::AliasDomain,
        LabelKey::BackendOption,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKey::Hostname => "hostname",
            LabelKey::Domain => "domain",
            LabelKey::Ssl => "ssl",
            LabelKey::SslOnly => "ssl_only",
            LabelKey::SslBackend => "ssl_backend",
            LabelKey::SslBackendVerify => "ssl_backend_tls_verify",
            LabelKey::SslCert => "ssl_cert",
            LabelKey::SslCertKey => "ssl_cert_key",
            LabelKey::Port => "port",
            LabelKey::WebsocketEndpoint => "websocket_endpoint",
            LabelKey::AliasDomain => "alias_domain",
            LabelKey::HealthCheck => "health_check",
            LabelKey::HealthCheckInterval => "health_check_interval",
            LabelKey::BalanceAlgorithm => "balance_algorithm",
            LabelKey::BackendOption => "backend_option",
            LabelKey::Network => "network",
            LabelKey::ContextRoot => "context_root",
            LabelKey::ContextRootRewrite => "context_root_rewrite",
            LabelKey::ExtName => "ext.name",
        }
    }
}

/// 컨테이너 메타데이터 해석 전략
pub trait LabelSource: Send + Sync {
    /// 단일 값. 빈 문자열은 없는 것으로 취급합니다.
    fn get(&self, container: &ContainerDescriptor, key: LabelKey) -> Option<String>;

    /// 다중 값. 순서는 정의되지 않습니다.
    fn get_all(&self, container: &ContainerDescriptor, key: LabelKey) -> Vec<String>;

    /// 로그 및 에러 메시지에 표시할 전체 키 이름
    fn qualified(&self, key: LabelKey) -> String;
}

/// 접두사 + 키로 다중 값 패턴을 미리 컴파일
fn compile_patterns(
    keys: &[LabelKey],
    qualify: impl Fn(LabelKey) -> String,
    separator: char,
) -> Result<HashMap<LabelKey, Regex>, RoutingError> {
    keys.iter()
        .map(|key| {
            let pattern = format!(
                "^{}(?:{}.+)?$",
                regex_lite::escape(&qualify(*key)),
                regex_lite::escape(&separator.to_string())
            );
            Regex::new(&pattern)
                .map(|re| (*key, re))
                .map_err(|e| RoutingError::LabelPattern { pattern, reason: e.to_string() })
        })
        .collect()
}

fn collect_matching(map: &HashMap<String, String>, pattern: Option<&Regex>) -> Vec<String> {
    let Some(pattern) = pattern else { return Vec::new() };
    map.iter()
        .filter(|(k, v)| pattern.is_match(k) && !v.trim().is_empty())
        .map(|(_, v)| v.trim().to_string())
        .collect()
}

/// Docker 라벨 기반 (`rproxy.alias_domain.1`)
pub struct PrefixedLabels {
    prefix: String,
    patterns: HashMap<LabelKey, Regex>,
}

impl PrefixedLabels {
    pub fn new(prefix: impl Into<String>) -> Result<Self, RoutingError> {
        let prefix = prefix.into();
        let patterns = compile_patterns(&LabelKey::MULTI_VALUED, |k| format!("{}{}", prefix, k.as_str()), '.')?;
        Ok(Self { prefix, patterns })
    }
}

impl LabelSource for PrefixedLabels {
    fn get(&self, container: &ContainerDescriptor, key: LabelKey) -> Option<String> {
        container
            .labels
            .get(&self.qualified(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_all(&self, container: &ContainerDescriptor, key: LabelKey) -> Vec<String> {
        collect_matching(&container.labels, self.patterns.get(&key))
    }

    fn qualified(&self, key: LabelKey) -> String {
        format!("{}{}", self.prefix, key.as_str())
    }
}

/// 레거시 환경 변수 기반 (`RPROXY_ALIAS_DOMAIN_1`)
pub struct EnvLabelSource {
    prefix: String,
    patterns: HashMap<LabelKey, Regex>,
}

impl EnvLabelSource {
    /// 라벨 접두사(`rproxy.`)를 환경 변수 접두사(`RPROXY_`)로 바꿔 사용합니다.
    pub fn new(label_prefix: &str) -> Result<Self, RoutingError> {
        let prefix = to_env_name(label_prefix);
        let patterns = compile_patterns(
            &LabelKey::MULTI_VALUED,
            |k| format!("{}{}", prefix, to_env_name(k.as_str())),
            '_',
        )?;
        Ok(Self { prefix, patterns })
    }
}

fn to_env_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

impl LabelSource for EnvLabelSource {
    fn get(&self, container: &ContainerDescriptor, key: LabelKey) -> Option<String> {
        container
            .env
            .get(&self.qualified(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_all(&self, container: &ContainerDescriptor, key: LabelKey) -> Vec<String> {
        collect_matching(&container.env, self.patterns.get(&key))
    }

    fn qualified(&self, key: LabelKey) -> String {
        format!("{}{}", self.prefix, to_env_name(key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn with_labels(pairs: &[(&str, &str)]) -> ContainerDescriptor {
        ContainerDescriptor {
            labels: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_multi_value_labels_match_prefix_only() {
        let source = PrefixedLabels::new("rproxy.").unwrap();
        let container = with_labels(&[
            ("rproxy.alias_domain", "a.example.com"),
            ("rproxy.alias_domain.7", "b.example.com"),
            ("rproxy.alias_domain.web", "c.example.com"),
            ("rproxy.alias_domainx", "ignored.example.com"),
            ("rproxy.alias_domain.2", "  "),
            ("other.alias_domain.1", "ignored.example.com"),
        ]);

        let aliases: HashSet<String> = source.get_all(&container, LabelKey::AliasDomain).into_iter().collect();
        assert_eq!(
            aliases,
            HashSet::from([
                "a.example.com".to_string(),
                "b.example.com".to_string(),
                "c.example.com".to_string(),
            ])
        );
    }

    #[test]
    fn test_prefix_is_matched_literally() {
        let source = PrefixedLabels::new("rproxy.").unwrap();
        let container = with_labels(&[("rproxyXbackend_option", "forwardfor")]);
        assert!(source.get_all(&container, LabelKey::BackendOption).is_empty());
    }

    #[test]
    fn test_env_source_reads_legacy_variables() {
        let source = EnvLabelSource::new("rproxy.").unwrap();
        let container = ContainerDescriptor {
            env: HashMap::from([
                ("RPROXY_HOSTNAME".to_string(), "api".to_string()),
                ("RPROXY_EXT_NAME".to_string(), "haproxy".to_string()),
                ("RPROXY_ALIAS_DOMAIN_1".to_string(), "one.example.com".to_string()),
                ("RPROXY_ALIAS_DOMAIN_2".to_string(), "two.example.com".to_string()),
            ]),
            ..Default::default()
        };

        assert_eq!(source.get(&container, LabelKey::Hostname).as_deref(), Some("api"));
        assert_eq!(source.get(&container, LabelKey::ExtName).as_deref(), Some("haproxy"));
        assert_eq!(source.get_all(&container, LabelKey::AliasDomain).len(), 2);
        assert_eq!(source.qualified(LabelKey::SslBackendVerify), "RPROXY_SSL_BACKEND_TLS_VERIFY");
    }
}
