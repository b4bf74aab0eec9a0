use std::collections::HashMap;
use std::sync::Arc;
use bollard::container::ListContainersOptions;
use tracing::{error, info, warn};

use super::{ReloadError, ReloadOutcome, ReloadState, Transitions};
use crate::docker::DockerClient;
use crate::settings::ReloadAction;

/// 실행 중인 프록시 컨테이너 각각에 시그널을 보내거나 재시작하는 리로드.
/// 컨테이너 간 원자성은 없으며 하나의 실패가 다른 컨테이너를 막지 않습니다.
pub struct SignalReload {
    client: Arc<dyn DockerClient>,
    /// `rproxy.ext.name=haproxy` 형태의 라벨 필터
    label_filter: String,
    action: ReloadAction,
}

impl SignalReload {
    pub fn new(client: Arc<dyn DockerClient>, label_filter: impl Into<String>, action: ReloadAction) -> Self {
        Self {
            client,
            label_filter: label_filter.into(),
            action,
        }
    }

    async fn apply(&self, id: &str) -> Result<(), ReloadError> {
        match &self.action {
            ReloadAction::Signal(signal) => self.client.kill_container(id, signal).await?,
            ReloadAction::Restart { timeout_secs } => self.client.restart_container(id, *timeout_secs).await?,
        }
        Ok(())
    }

    pub(crate) async fn run(&self, transitions: &Transitions) -> Result<ReloadOutcome, ReloadError> {
        transitions.enter(ReloadState::Signaling);
        let result = self.signal_all().await;
        transitions.enter(ReloadState::Idle);
        result
    }

    async fn signal_all(&self) -> Result<ReloadOutcome, ReloadError> {
        let options = ListContainersOptions::<String> {
            filters: HashMap::from([("label".to_string(), vec![self.label_filter.clone()])]),
            ..Default::default()
        };
        let proxies = self.client.list_containers(Some(options)).await?;
        if proxies.is_empty() {
            warn!(filter = %self.label_filter, "리로드할 프록시 컨테이너가 없음");
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for proxy in proxies {
            let Some(id) = proxy.id else { continue };
            match self.apply(&id).await {
                Ok(()) => {
                    info!(container_id = %id, action = ?self.action, "프록시 컨테이너 리로드 성공");
                    succeeded.push(id);
                }
                Err(e) => {
                    error!(container_id = %id, error = %e, "프록시 컨테이너 리로드 실패");
                    failed.push(id);
                }
            }
        }

        Ok(ReloadOutcome::Signaled { succeeded, failed })
    }
}
