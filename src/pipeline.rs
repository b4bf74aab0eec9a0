//! 이벤트 → 디바운스 → 모델 생성 → 렌더링 → 리로드 파이프라인.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::cache::{CacheError, CoalescingCache, TouchPolicy};
use crate::docker::ProxyEvent;
use crate::reload::{ReloadError, ReloadOrchestrator, ReloadOutcome};
use crate::render::{write_config, ConfigRenderer, RenderError};
use crate::routing::{RoutingError, RoutingModelBuilder};

/// 디바운스 캐시에 사용하는 키
pub const RELOAD_KEY: &str = "reload";

pub type ReloadCache = CoalescingCache<&'static str, bool>;

const QUALIFYING_ACTIONS: [&str; 8] = [
    "start", "stop", "die", "kill", "destroy", "pause", "unpause", "update",
];

#[derive(Debug)]
pub enum PipelineError {
    Routing(RoutingError),
    Render(RenderError),
    Reload(ReloadError),
    Cache(CacheError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Routing(e) => write!(f, "라우팅 모델 생성 실패: {}", e),
            PipelineError::Render(e) => write!(f, "설정 렌더링 실패: {}", e),
            PipelineError::Reload(e) => write!(f, "프록시 리로드 실패: {}", e),
            PipelineError::Cache(e) => write!(f, "디바운스 캐시 생성 실패: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Routing(e) => Some(e),
            PipelineError::Render(e) => Some(e),
            PipelineError::Reload(e) => Some(e),
            PipelineError::Cache(e) => Some(e),
        }
    }
}

impl From<RoutingError> for PipelineError {
    fn from(err: RoutingError) -> Self {
        PipelineError::Routing(err)
    }
}

impl From<RenderError> for PipelineError {
    fn from(err: RenderError) -> Self {
        PipelineError::Render(err)
    }
}

impl From<ReloadError> for PipelineError {
    fn from(err: ReloadError) -> Self {
        PipelineError::Reload(err)
    }
}

impl From<CacheError> for PipelineError {
    fn from(err: CacheError) -> Self {
        PipelineError::Cache(err)
    }
}

/// 리로드가 필요한 이벤트인지 판단합니다.
/// 관리 대상 프록시 컨테이너 자신의 이벤트는 리로드 루프를 막기 위해 무시합니다.
pub fn is_qualifying(event: &ProxyEvent, proxy_label: &str) -> bool {
    match event {
        ProxyEvent::EngineStart | ProxyEvent::Poll { .. } => true,
        ProxyEvent::EngineStop => false,
        ProxyEvent::Container { action, attributes, .. } => {
            if attributes.contains_key(proxy_label) {
                return false;
            }
            QUALIFYING_ACTIONS.contains(&action.as_str()) || action.starts_with("health_status")
        }
    }
}

/// 리로드 한 사이클: 모델 생성 → 렌더링 → 파일 기록 → 리로드
pub struct Pipeline {
    builder: RoutingModelBuilder,
    renderer: Box<dyn ConfigRenderer>,
    orchestrator: ReloadOrchestrator,
    config_path: PathBuf,
}

impl Pipeline {
    pub fn new(
        builder: RoutingModelBuilder,
        renderer: Box<dyn ConfigRenderer>,
        orchestrator: ReloadOrchestrator,
        config_path: PathBuf,
    ) -> Self {
        Self {
            builder,
            renderer,
            orchestrator,
            config_path,
        }
    }

    /// 렌더링이 실패하면 기존 설정 파일은 그대로 두고 리로드하지 않습니다.
    pub async fn run_cycle(&self) -> Result<ReloadOutcome, PipelineError> {
        let model = self.builder.build().await?;
        let rendered = self.renderer.render(&model)?;
        write_config(&self.config_path, &rendered).await?;
        info!(
            backend = self.renderer.kind().as_str(),
            path = %self.config_path.display(),
            hosts = model.hosts.len(),
            "프록시 설정 기록"
        );

        let outcome = self.orchestrator.reload().await?;
        Ok(outcome)
    }
}

/// 이벤트를 받아 디바운스하고 단일 워커에서 사이클을 실행합니다.
pub struct Reconciler {
    pipeline: Arc<Pipeline>,
    cache: ReloadCache,
    trigger_rx: mpsc::Receiver<()>,
    proxy_label: String,
}

impl Reconciler {
    pub fn new(
        pipeline: Arc<Pipeline>,
        window: Duration,
        policy: TouchPolicy,
        proxy_label: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        // 용량 1: 이미 대기 중인 트리거가 있으면 새 트리거는 합쳐짐
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let cache = CoalescingCache::new(
            window,
            policy,
            Arc::new(move |_key: &'static str, _value: bool| {
                if trigger_tx.try_send(()).is_err() {
                    debug!("이미 대기 중인 리로드가 있어 트리거를 합침");
                }
            }),
        )?;

        Ok(Self {
            pipeline,
            cache,
            trigger_rx,
            proxy_label: proxy_label.into(),
        })
    }

    /// 인증서 감시 등 외부에서 리로드를 요청할 때 사용
    pub fn cache(&self) -> ReloadCache {
        self.cache.clone()
    }

    /// `EngineStop`을 받거나 이벤트 채널이 닫히면 진행 중인 사이클을 마치고 종료합니다.
    pub async fn run(self, mut events: mpsc::Receiver<ProxyEvent>) {
        let Reconciler {
            pipeline,
            cache,
            trigger_rx,
            proxy_label,
        } = self;

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = tokio::spawn(Self::work(pipeline, cache.clone(), trigger_rx, stop_rx));

        while let Some(event) = events.recv().await {
            if event == ProxyEvent::EngineStop {
                info!("엔진 종료 이벤트 수신, 파이프라인 종료");
                break;
            }
            if !is_qualifying(&event, &proxy_label) {
                debug!(event = %event.name(), "리로드 대상이 아닌 이벤트");
                continue;
            }

            let _work = cache.begin_work();
            debug!(event = %event.name(), "리로드 예약");
            cache.set(RELOAD_KEY, true);
        }

        cache.close();
        let _ = stop_tx.send(true);
        if let Err(e) = worker.await {
            error!(error = %e, "리로드 워커 비정상 종료");
        }
    }

    async fn work(
        pipeline: Arc<Pipeline>,
        cache: ReloadCache,
        mut trigger_rx: mpsc::Receiver<()>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                trigger = trigger_rx.recv() => {
                    if trigger.is_none() {
                        break;
                    }
                }
                _ = stop_rx.changed() => break,
            }

            // 사이클 동안 들어온 이벤트의 만료는 사이클이 끝날 때까지 보류
            let _work = cache.begin_work();
            let span = info_span!("reload_cycle", cycle_id = %Uuid::new_v4());
            async {
                info!("리로드 사이클 시작");
                match pipeline.run_cycle().await {
                    Ok(outcome) => info!(outcome = ?outcome, "리로드 사이클 완료"),
                    Err(e) => error!(error = %e, "리로드 사이클 실패"),
                }
            }
            .instrument(span)
            .await;
        }
        debug!("리로드 워커 종료");
    }
}
