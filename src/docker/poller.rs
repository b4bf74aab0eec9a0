use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use bollard::container::ListContainersOptions;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{DockerClient, DockerError, ProxyEvent};

/// 이벤트 스트림을 보완하는 폴링 감시.
/// 실행 중인 컨테이너 ID 집합이 바뀌면 `ProxyEvent::Poll`을 보냅니다.
pub struct ContainerPoller {
    client: Arc<dyn DockerClient>,
    period: Duration,
}

impl ContainerPoller {
    pub fn new(client: Arc<dyn DockerClient>, period: Duration) -> Self {
        Self { client, period }
    }

    async fn running_ids(&self) -> Result<Vec<String>, DockerError> {
        let options = ListContainersOptions::<String> {
            filters: HashMap::from([("status".to_string(), vec!["running".to_string()])]),
            ..Default::default()
        };
        let mut ids: Vec<String> = self
            .client
            .list_containers(Some(options))
            .await?
            .into_iter()
            .filter_map(|container| container.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn run(&self, tx: mpsc::Sender<ProxyEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<Vec<String>> = None;

        info!(period_ms = self.period.as_millis() as u64, "컨테이너 폴링 시작");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let ids = match self.running_ids().await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(error = %e, "폴링 중 컨테이너 목록 조회 실패");
                    continue;
                }
            };

            // 첫 조회는 기준값만 기록 (시작 시 재구성은 EngineStart가 담당)
            let changed = last.as_ref().is_some_and(|prev| prev != &ids);
            if changed {
                debug!(running = ids.len(), "실행 중인 컨테이너 집합 변경 감지");
                if tx.send(ProxyEvent::Poll { running: ids.len() }).await.is_err() {
                    break;
                }
            }
            last = Some(ids);
        }

        debug!("컨테이너 폴링 종료");
    }
}
