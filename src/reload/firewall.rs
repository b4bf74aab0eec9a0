use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::ReloadError;

/// 전환 구간 동안 신규 연결(SYN)을 막아 클라이언트가 재전송하도록 만드는 수단
#[async_trait]
pub trait Firewall: Send + Sync {
    async fn drop_syn(&self, ports: &[u16]) -> Result<(), ReloadError>;

    async fn resume_syn(&self, ports: &[u16]) -> Result<(), ReloadError>;
}

/// iptables 기반 구현. 권한 있는 리눅스 호스트에서만 동작합니다.
pub struct IptablesFirewall {
    binary: String,
}

impl Default for IptablesFirewall {
    fn default() -> Self {
        Self { binary: "iptables".to_string() }
    }
}

impl IptablesFirewall {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn rule_args(op: &str, ports: &[u16]) -> Vec<String> {
        let ports = ports.iter().map(u16::to_string).collect::<Vec<_>>().join(",");
        [op, "INPUT", "-p", "tcp", "-m", "multiport", "--dports", ports.as_str(), "--syn", "-j", "DROP"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    async fn apply(&self, action: &'static str, args: Vec<String>) -> Result<(), ReloadError> {
        debug!(binary = %self.binary, args = ?args, "방화벽 규칙 적용");
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| ReloadError::Firewall { action, reason: e.to_string() })?;

        if !output.status.success() {
            return Err(ReloadError::Firewall {
                action,
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Firewall for IptablesFirewall {
    async fn drop_syn(&self, ports: &[u16]) -> Result<(), ReloadError> {
        if ports.is_empty() {
            return Ok(());
        }
        self.apply("SYN 드롭", Self::rule_args("-I", ports)).await
    }

    async fn resume_syn(&self, ports: &[u16]) -> Result<(), ReloadError> {
        if ports.is_empty() {
            return Ok(());
        }
        self.apply("SYN 드롭 해제", Self::rule_args("-D", ports)).await
    }
}

/// SYN 드롭을 끈 경우. 상태 전이는 그대로 보고됩니다.
pub struct NoopFirewall;

#[async_trait]
impl Firewall for NoopFirewall {
    async fn drop_syn(&self, _ports: &[u16]) -> Result<(), ReloadError> {
        Ok(())
    }

    async fn resume_syn(&self, _ports: &[u16]) -> Result<(), ReloadError> {
        Ok(())
    }
}
