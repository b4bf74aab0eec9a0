use std::fmt::Write;
use super::{phrase, token, ConfigRenderer, RenderError, GENERATED_HEADER};
use crate::routing::{RoutingModel, SslVerify, VirtualHost};
use crate::settings::{BackendKind, ExtensionConfig};

pub struct NginxRenderer;

/// 라벨의 분산 알고리즘을 upstream 지시어로 변환. roundrobin은 기본 동작이라 지시어가 없습니다.
fn balance_directive(host: &VirtualHost) -> Result<Option<&'static str>, RenderError> {
    match host.balance_algorithm.as_str() {
        "roundrobin" => Ok(None),
        "leastconn" | "least_conn" => Ok(Some("least_conn")),
        "source" | "ip_hash" => Ok(Some("ip_hash")),
        "random" => Ok(Some("random")),
        _ => Err(RenderError::UnsupportedBalance {
            backend: "nginx",
            domain: host.domain.clone(),
            algorithm: host.balance_algorithm.clone(),
        }),
    }
}

impl NginxRenderer {
    fn main(&self, out: &mut String, ext: &ExtensionConfig) -> Result<(), RenderError> {
        writeln!(out, "user {};", token("user", &ext.user)?)?;
        writeln!(out, "worker_processes {};", ext.worker_processes)?;
        writeln!(out, "worker_rlimit_nofile {};", ext.rlimit_nofile)?;
        writeln!(out)?;
        writeln!(out, "events {{")?;
        writeln!(out, "    worker_connections {};", ext.max_connections)?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        Ok(())
    }

    fn http_settings(&self, out: &mut String, model: &RoutingModel) -> Result<(), RenderError> {
        let ext = &model.extension;
        writeln!(out, "    sendfile on;")?;
        writeln!(out, "    proxy_connect_timeout {}s;", ext.proxy_connect_timeout)?;
        writeln!(out, "    proxy_send_timeout {}s;", ext.proxy_send_timeout)?;
        writeln!(out, "    proxy_read_timeout {}s;", ext.proxy_read_timeout)?;
        writeln!(out, "    send_timeout {}s;", ext.send_timeout)?;
        if let Some(addr) = &ext.syslog_addr {
            writeln!(out, "    access_log syslog:server={};", token("syslog_addr", addr)?)?;
        }
        writeln!(out, "    ssl_protocols {};", phrase("ssl_protocols", &ext.ssl_protocols)?)?;
        writeln!(out, "    ssl_ciphers {};", token("ssl_ciphers", &ext.ssl_ciphers)?)?;

        if model.hosts.iter().any(|h| !h.websocket_endpoints.is_empty()) {
            writeln!(out)?;
            writeln!(out, "    map $http_upgrade $connection_upgrade {{")?;
            writeln!(out, "        default upgrade;")?;
            writeln!(out, "        '' close;")?;
            writeln!(out, "    }}")?;
        }
        writeln!(out)?;
        Ok(())
    }

    fn upstream(&self, out: &mut String, host: &VirtualHost) -> Result<(), RenderError> {
        writeln!(out, "    upstream {} {{", host.backend_name())?;
        if let Some(directive) = balance_directive(host)? {
            writeln!(out, "        {};", directive)?;
        }
        for upstream in &host.upstreams {
            writeln!(out, "        server {};", token("address", &upstream.address)?)?;
        }
        writeln!(out, "    }}")?;
        writeln!(out)?;
        Ok(())
    }

    fn locations(&self, out: &mut String, host: &VirtualHost) -> Result<(), RenderError> {
        let scheme = if host.ssl_backend { "https" } else { "http" };
        let name = host.backend_name();
        let root = match &host.context_root {
            Some(root) => token("context_root", root)?,
            None => "/",
        };

        writeln!(out, "        location {} {{", root)?;
        if host.context_root_rewrite && root != "/" {
            writeln!(out, "            rewrite ^{}/?(.*)$ /$1 break;", root.trim_end_matches('/'))?;
        }
        writeln!(out, "            proxy_pass {}://{};", scheme, name)?;
        writeln!(out, "            proxy_set_header Host $host;")?;
        writeln!(out, "            proxy_set_header X-Real-IP $remote_addr;")?;
        writeln!(out, "            proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;")?;
        writeln!(out, "            proxy_set_header X-Forwarded-Proto $scheme;")?;
        if host.ssl_backend && host.ssl_backend_verify == SslVerify::Required {
            writeln!(out, "            proxy_ssl_verify on;")?;
        }
        for option in &host.backend_options {
            writeln!(out, "            {};", phrase("backend_option", option)?)?;
        }
        writeln!(out, "        }}")?;

        for endpoint in &host.websocket_endpoints {
            writeln!(out, "        location {} {{", token("websocket_endpoint", endpoint)?)?;
            writeln!(out, "            proxy_pass {}://{};", scheme, name)?;
            writeln!(out, "            proxy_http_version 1.1;")?;
            writeln!(out, "            proxy_set_header Host $host;")?;
            writeln!(out, "            proxy_set_header Upgrade $http_upgrade;")?;
            writeln!(out, "            proxy_set_header Connection $connection_upgrade;")?;
            writeln!(out, "        }}")?;
        }
        Ok(())
    }

    fn servers(&self, out: &mut String, host: &VirtualHost, ext: &ExtensionConfig) -> Result<(), RenderError> {
        let names = host
            .server_names
            .iter()
            .map(|n| token("server_name", n))
            .collect::<Result<Vec<_>, _>>()?
            .join(" ");

        writeln!(out, "    server {{")?;
        writeln!(out, "        listen {};", ext.port)?;
        writeln!(out, "        server_name {};", names)?;
        if host.ssl_only {
            writeln!(out, "        return 301 https://$host$request_uri;")?;
        } else {
            self.locations(out, host)?;
        }
        writeln!(out, "    }}")?;
        writeln!(out)?;

        if host.ssl || host.ssl_only {
            let cert = host
                .ssl_cert
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .or_else(|| ext.ssl_cert.clone())
                .ok_or_else(|| RenderError::MissingCertificate { domain: host.domain.clone() })?;
            let key = host
                .ssl_cert_key
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .or_else(|| ext.ssl_cert_key.clone())
                .unwrap_or_else(|| cert.clone());

            writeln!(out, "    server {{")?;
            writeln!(out, "        listen {} ssl;", ext.ssl_port)?;
            writeln!(out, "        server_name {};", names)?;
            writeln!(out, "        ssl_certificate {};", token("ssl_cert", &cert)?)?;
            writeln!(out, "        ssl_certificate_key {};", token("ssl_cert_key", &key)?)?;
            self.locations(out, host)?;
            writeln!(out, "    }}")?;
            writeln!(out)?;
        }
        Ok(())
    }
}

impl ConfigRenderer for NginxRenderer {
    fn render(&self, model: &RoutingModel) -> Result<String, RenderError> {
        let ext = &model.extension;
        let mut out = String::new();
        writeln!(out, "{}", GENERATED_HEADER)?;
        self.main(&mut out, ext)?;

        writeln!(out, "http {{")?;
        self.http_settings(&mut out, model)?;
        for host in &model.hosts {
            self.upstream(&mut out, host)?;
        }
        for host in &model.hosts {
            self.servers(&mut out, host, ext)?;
        }
        writeln!(out, "}}")?;
        Ok(out)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Nginx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::render::tests::{model_for, model_with, sample_host};
    use crate::settings::ExtensionConfig;

    #[test]
    fn test_render_upstream_and_server_blocks() {
        let mut host = sample_host("api.example.com", &["10.0.0.2:32768", "10.0.0.3:32768"]);
        host.balance_algorithm = "leastconn".to_string();
        host.websocket_endpoints = vec!["/ws".to_string()];
        let config = NginxRenderer.render(&model_with(vec![host])).unwrap();

        assert!(config.contains("upstream api_example_com {\n        least_conn;\n        server 10.0.0.2:32768;\n        server 10.0.0.3:32768;\n    }"));
        assert!(config.contains("server_name api.example.com;"));
        assert!(config.contains("proxy_pass http://api_example_com;"));
        assert!(config.contains("location /ws {"));
        assert!(config.contains("map $http_upgrade $connection_upgrade"));
        assert!(config.ends_with("}\n"));
    }

    #[test]
    fn test_similar_domains_get_separate_upstreams() {
        let model = model_with(vec![
            sample_host("my-app.example.com", &["10.0.0.2:80"]),
            sample_host("my.app.example.com", &["10.0.0.3:80"]),
        ]);
        let config = NginxRenderer.render(&model).unwrap();

        assert_eq!(config.matches("upstream my-2dapp_example_com {").count(), 1);
        assert_eq!(config.matches("upstream my_app_example_com {").count(), 1);
        assert!(config.contains("proxy_pass http://my-2dapp_example_com;"));
        assert!(config.contains("proxy_pass http://my_app_example_com;"));
    }

    #[test]
    fn test_context_root_rewrite() {
        let mut host = sample_host("app.example.com", &["10.0.0.2:8080"]);
        host.context_root = Some("/app".to_string());
        host.context_root_rewrite = true;
        let config = NginxRenderer.render(&model_with(vec![host])).unwrap();

        assert!(config.contains("location /app {"));
        assert!(config.contains("rewrite ^/app/?(.*)$ /$1 break;"));
    }

    #[test]
    fn test_ssl_host_uses_label_certificate_or_default() {
        let mut labelled = sample_host("a.example.com", &["10.0.0.2:80"]);
        labelled.ssl = true;
        labelled.ssl_cert = Some(PathBuf::from("/certs/a.pem"));
        labelled.ssl_cert_key = Some(PathBuf::from("/certs/a.key"));
        let mut fallback = sample_host("b.example.com", &["10.0.0.3:80"]);
        fallback.ssl_only = true;

        let extension = ExtensionConfig {
            ssl_cert: Some("/certs/default.pem".to_string()),
            ..ExtensionConfig::default()
        };
        let config = NginxRenderer.render(&model_for(vec![labelled, fallback], extension)).unwrap();

        assert!(config.contains("ssl_certificate /certs/a.pem;"));
        assert!(config.contains("ssl_certificate_key /certs/a.key;"));
        assert!(config.contains("ssl_certificate /certs/default.pem;"));
        assert!(config.contains("return 301 https://$host$request_uri;"));
    }

    #[test]
    fn test_ssl_host_without_certificate_fails() {
        let mut host = sample_host("a.example.com", &["10.0.0.2:80"]);
        host.ssl = true;
        let result = NginxRenderer.render(&model_with(vec![host]));
        assert!(matches!(result, Err(RenderError::MissingCertificate { .. })));
    }
}
