use std::fmt::Write;
use super::{phrase, token, ConfigRenderer, RenderError, GENERATED_HEADER};
use crate::routing::{RoutingModel, SslVerify, VirtualHost};
use crate::settings::{BackendKind, ExtensionConfig};

const BALANCE_ALGORITHMS: [&str; 9] = [
    "roundrobin", "static-rr", "leastconn", "first", "source", "uri", "url_param", "hdr", "random",
];

const WEBSOCKET_TUNNEL_TIMEOUT: &str = "3600s";

pub struct HaproxyRenderer;

impl HaproxyRenderer {
    fn global(&self, out: &mut String, ext: &ExtensionConfig) -> Result<(), RenderError> {
        writeln!(out, "global")?;
        writeln!(out, "    maxconn {}", ext.max_conn)?;
        if let Some(addr) = &ext.syslog_addr {
            writeln!(out, "    log {} local0", token("syslog_addr", addr)?)?;
        }
        if let Some(dh) = ext.ssl_default_dh_param {
            writeln!(out, "    tune.ssl.default-dh-param {}", dh)?;
        }
        if let Some(opts) = &ext.ssl_opts {
            writeln!(out, "    ssl-default-bind-options {}", phrase("ssl_opts", opts)?)?;
        }
        writeln!(out, "    ssl-default-bind-ciphers {}", token("ssl_ciphers", &ext.ssl_ciphers)?)?;
        if let Some(verify) = &ext.ssl_server_verify {
            writeln!(out, "    ssl-server-verify {}", token("ssl_server_verify", verify)?)?;
        }
        writeln!(out)?;

        writeln!(out, "defaults")?;
        writeln!(out, "    mode http")?;
        if ext.syslog_addr.is_some() {
            writeln!(out, "    log global")?;
        }
        writeln!(out, "    option httplog")?;
        writeln!(out, "    option dontlognull")?;
        writeln!(out, "    option forwardfor")?;
        writeln!(out, "    timeout connect {}ms", ext.connect_timeout_ms)?;
        writeln!(out, "    timeout client {}ms", ext.client_timeout_ms)?;
        writeln!(out, "    timeout server {}ms", ext.server_timeout_ms)?;
        writeln!(out)?;
        Ok(())
    }

    fn frontend(&self, out: &mut String, model: &RoutingModel) -> Result<(), RenderError> {
        let ext = &model.extension;

        writeln!(out, "frontend http-in")?;
        writeln!(out, "    bind *:{}", ext.port)?;

        // 기본 인증서 뒤에 호스트별 인증서를 이어 붙임 (SNI로 선택)
        let mut certs: Vec<String> = Vec::new();
        if let Some(default) = &ext.ssl_cert {
            certs.push(token("ssl_cert", default)?.to_string());
        }
        for host in model.hosts.iter().filter(|h| h.ssl) {
            if let Some(cert) = &host.ssl_cert {
                let cert = cert.to_string_lossy();
                let cert = token("ssl_cert", &cert)?.to_string();
                if !certs.contains(&cert) {
                    certs.push(cert);
                }
            }
        }
        if !certs.is_empty() {
            let crt = certs.iter().map(|c| format!("crt {}", c)).collect::<Vec<_>>().join(" ");
            writeln!(out, "    bind *:{} ssl {}", ext.ssl_port, crt)?;
        }

        writeln!(out, "    http-request set-header X-Forwarded-Port %[dst_port]")?;
        writeln!(out, "    http-request add-header X-Forwarded-Proto https if {{ ssl_fc }}")?;

        if let (Some(user), Some(pass)) = (&ext.admin_user, &ext.admin_pass) {
            writeln!(out, "    stats enable")?;
            writeln!(out, "    stats uri /haproxy?stats")?;
            writeln!(out, "    stats realm Haproxy\\ Statistics")?;
            writeln!(out, "    stats auth {}:{}", token("admin_user", user)?, token("admin_pass", pass)?)?;
        }

        for host in &model.hosts {
            let name = host.backend_name();
            let domain = token("domain", &host.domain)?;
            writeln!(out, "    acl host_{} req.hdr(host),field(1,:) -i {}", name, domain)?;
            if host.ssl_only {
                writeln!(out, "    redirect scheme https code 301 if host_{} !{{ ssl_fc }}", name)?;
            }
        }
        for host in &model.hosts {
            let name = host.backend_name();
            writeln!(out, "    use_backend {} if host_{}", name, name)?;
        }
        writeln!(out)?;
        Ok(())
    }

    fn backend(&self, out: &mut String, host: &VirtualHost) -> Result<(), RenderError> {
        let algorithm = phrase("balance_algorithm", &host.balance_algorithm)?;
        let base = algorithm.split_whitespace().next().unwrap_or_default();
        if !BALANCE_ALGORITHMS.contains(&base) {
            return Err(RenderError::UnsupportedBalance {
                backend: "haproxy",
                domain: host.domain.clone(),
                algorithm: host.balance_algorithm.clone(),
            });
        }

        writeln!(out, "backend {}", host.backend_name())?;
        writeln!(out, "    balance {}", algorithm)?;
        for option in &host.backend_options {
            writeln!(out, "    option {}", phrase("backend_option", option)?)?;
        }
        if let Some(check) = &host.health_check {
            writeln!(out, "    option httpchk {}", phrase("health_check", check)?)?;
        }
        if !host.websocket_endpoints.is_empty() {
            writeln!(out, "    timeout tunnel {}", WEBSOCKET_TUNNEL_TIMEOUT)?;
        }

        for upstream in &host.upstreams {
            let mut line = format!(
                "    server {} {}",
                token("container_name", &upstream.container_name)?,
                token("address", &upstream.address)?
            );
            if host.health_check.is_some() {
                write!(line, " check inter {}", upstream.check_interval_ms)?;
            }
            if host.ssl_backend {
                write!(line, " ssl verify {}", host.ssl_backend_verify)?;
                if host.ssl_backend_verify == SslVerify::Required {
                    write!(line, " ca-file @system-ca")?;
                }
            }
            writeln!(out, "{}", line)?;
        }
        writeln!(out)?;
        Ok(())
    }
}

impl ConfigRenderer for HaproxyRenderer {
    fn render(&self, model: &RoutingModel) -> Result<String, RenderError> {
        let mut out = String::new();
        writeln!(out, "{}", GENERATED_HEADER)?;
        self.global(&mut out, &model.extension)?;
        self.frontend(&mut out, model)?;
        for host in &model.hosts {
            self.backend(&mut out, host)?;
        }
        Ok(out)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Haproxy
    }
}
