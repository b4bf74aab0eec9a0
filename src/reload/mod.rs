//! 실행 중인 프록시에 새 설정을 적용합니다.
//!
//! 프로세스 재실행(드레인)과 컨테이너 시그널 두 가지 방식을 지원하며, 한 번에 하나의 리로드만 수행합니다.

mod error;
mod firewall;
mod process;
mod relaunch;
mod signal;

pub use error::ReloadError;
pub use firewall::{Firewall, IptablesFirewall, NoopFirewall};
pub use process::{is_alive, PidFile, ProcessControl, ProxyProcess};
pub use relaunch::RelaunchReload;
pub use signal::SignalReload;

use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::docker::DockerClient;
use crate::routing::LabelKey;
use crate::settings::{ExtensionConfig, ReloadMode};

/// 리로드 진행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    DroppingSyn,
    Relaunching,
    ResumingSyn,
    Signaling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Relaunched {
        old_pid: Option<u32>,
        new_pid: u32,
    },
    Signaled {
        succeeded: Vec<String>,
        failed: Vec<String>,
    },
}

/// 상태 전이 발행
pub(crate) struct Transitions {
    tx: broadcast::Sender<ReloadState>,
}

impl Transitions {
    pub(crate) fn enter(&self, state: ReloadState) {
        debug!(state = ?state, "리로드 상태 전이");
        // 구독자가 없어도 진행
        let _ = self.tx.send(state);
    }
}

enum Protocol {
    Relaunch(RelaunchReload),
    Signal(SignalReload),
}

pub struct ReloadOrchestrator {
    protocol: Protocol,
    transitions: Transitions,
    in_flight: Mutex<()>,
}

impl ReloadOrchestrator {
    fn with_protocol(protocol: Protocol) -> Self {
        let (tx, _) = broadcast::channel(32);
        Self {
            protocol,
            transitions: Transitions { tx },
            in_flight: Mutex::new(()),
        }
    }

    pub fn relaunch(reload: RelaunchReload) -> Self {
        Self::with_protocol(Protocol::Relaunch(reload))
    }

    pub fn signal(reload: SignalReload) -> Self {
        Self::with_protocol(Protocol::Signal(reload))
    }

    /// 설정된 리로드 모드에 맞는 오케스트레이터 생성
    pub fn from_settings(client: Arc<dyn DockerClient>, extension: &ExtensionConfig, label_prefix: &str) -> Self {
        match extension.reload_mode() {
            ReloadMode::Relaunch => {
                let firewall: Arc<dyn Firewall> = if extension.syn_drop {
                    Arc::new(IptablesFirewall::default())
                } else {
                    Arc::new(NoopFirewall)
                };
                Self::relaunch(RelaunchReload::new(
                    firewall,
                    Arc::new(ProxyProcess::new(extension.proxy_binary.clone())),
                    PidFile::new(extension.pid_path.clone()),
                    extension.config_path(),
                    extension.listen_ports(),
                    extension.drain_grace(),
                ))
            }
            ReloadMode::Signal => {
                let filter = format!("{}{}={}", label_prefix, LabelKey::ExtName.as_str(), extension.name());
                Self::signal(SignalReload::new(client, filter, extension.reload_action()))
            }
        }
    }

    /// 상태 전이 구독
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadState> {
        self.transitions.tx.subscribe()
    }

    pub async fn reload(&self) -> Result<ReloadOutcome, ReloadError> {
        let _guard = self.in_flight.lock().await;
        match &self.protocol {
            Protocol::Relaunch(reload) => reload.run(&self.transitions).await,
            Protocol::Signal(reload) => reload.run(&self.transitions).await,
        }
    }
}
