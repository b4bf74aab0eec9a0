use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::{Firewall, PidFile, ProcessControl, ReloadError, ReloadOutcome, ReloadState, Transitions};

/// 새 프로세스를 띄우고 기존 프로세스를 드레인하는 리로드
///
/// `Idle → DroppingSyn → Relaunching → ResumingSyn → Idle`
pub struct RelaunchReload {
    firewall: Arc<dyn Firewall>,
    process: Arc<dyn ProcessControl>,
    pid_file: PidFile,
    config_path: PathBuf,
    ports: Vec<u16>,
    drain_grace: Duration,
}

impl RelaunchReload {
    pub fn new(
        firewall: Arc<dyn Firewall>,
        process: Arc<dyn ProcessControl>,
        pid_file: PidFile,
        config_path: PathBuf,
        ports: Vec<u16>,
        drain_grace: Duration,
    ) -> Self {
        Self {
            firewall,
            process,
            pid_file,
            config_path,
            ports,
            drain_grace,
        }
    }

    pub(crate) async fn run(&self, transitions: &Transitions) -> Result<ReloadOutcome, ReloadError> {
        transitions.enter(ReloadState::DroppingSyn);
        if let Err(e) = self.firewall.drop_syn(&self.ports).await {
            warn!(error = %e, ports = ?self.ports, "SYN 드롭 규칙 설치 실패, 보호 없이 진행");
        }
        sleep(self.drain_grace).await;

        transitions.enter(ReloadState::Relaunching);
        let result = self.relaunch().await;

        // 실패해도 드롭 규칙은 반드시 해제
        transitions.enter(ReloadState::ResumingSyn);
        if let Err(e) = self.firewall.resume_syn(&self.ports).await {
            warn!(error = %e, ports = ?self.ports, "SYN 드롭 규칙 해제 실패");
        }

        transitions.enter(ReloadState::Idle);
        result
    }

    async fn relaunch(&self) -> Result<ReloadOutcome, ReloadError> {
        let old_pid = self.pid_file.read().await?;
        let new_pid = self.process.launch(&self.config_path, old_pid).await?;

        if let Some(old_pid) = old_pid {
            self.process.wait_for_exit(old_pid).await?;
        }
        self.pid_file.write(new_pid).await?;

        info!(old_pid = ?old_pid, new_pid, "프록시 재시작 완료");
        Ok(ReloadOutcome::Relaunched { old_pid, new_pid })
    }
}
