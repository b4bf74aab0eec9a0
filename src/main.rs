use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use reverse_proxy_sync::docker::{
    BollardDockerClient, ConnectionSupervisor, ContainerPoller, DockerClient, Endpoint, RetryPolicy,
};
use reverse_proxy_sync::logging::init_logging;
use reverse_proxy_sync::pipeline::{Pipeline, Reconciler};
use reverse_proxy_sync::reload::ReloadOrchestrator;
use reverse_proxy_sync::render::renderer_for;
use reverse_proxy_sync::routing::{EnvLabelSource, LabelKey, LabelSource, PrefixedLabels, RoutingModelBuilder};
use reverse_proxy_sync::settings::Settings;
use reverse_proxy_sync::watcher::CertWatcher;

const EVENT_CHANNEL_SIZE: usize = 64;

#[tokio::main]
async fn main() {
    // 설정 로드 (로깅 초기화 전이므로 stderr로 출력)
    let settings = match Settings::load().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("설정 로드 실패: {}", e);
            std::process::exit(1);
        }
    };

    // 가드는 main이 끝날 때까지 유지
    let _log_guard = match init_logging(&settings.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("로깅 초기화 실패: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        endpoint = %settings.docker.endpoint,
        backend = settings.extension.kind.as_str(),
        "reverse-proxy-sync 시작"
    );

    let endpoint = match Endpoint::parse(&settings.docker.endpoint) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!(error = %e, "Docker 엔드포인트 해석 실패");
            std::process::exit(1);
        }
    };

    let client: Arc<dyn DockerClient> = match BollardDockerClient::connect(&settings.docker) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Docker 클라이언트 생성 실패");
            std::process::exit(1);
        }
    };

    let prefix = settings.docker.label_prefix.as_str();
    let labels: Arc<dyn LabelSource> = if settings.docker.env_metadata {
        EnvLabelSource::new(prefix).map(|source| Arc::new(source) as Arc<dyn LabelSource>)
    } else {
        PrefixedLabels::new(prefix).map(|source| Arc::new(source) as Arc<dyn LabelSource>)
    }
    .unwrap_or_else(|e| {
        error!(error = %e, "라벨 소스 생성 실패");
        std::process::exit(1);
    });

    let extension = Arc::new(settings.extension.clone());
    let builder = RoutingModelBuilder::new(
        client.clone(),
        labels,
        extension.clone(),
        settings.docker.engine_host(),
        RetryPolicy::from(&settings.docker.retry),
    );
    let orchestrator = ReloadOrchestrator::from_settings(client.clone(), &extension, prefix);
    let pipeline = Arc::new(Pipeline::new(
        builder,
        renderer_for(extension.kind),
        orchestrator,
        extension.config_path(),
    ));

    let proxy_label = format!("{}{}", prefix, LabelKey::ExtName.as_str());
    let reconciler = match Reconciler::new(
        pipeline,
        settings.debounce.window(),
        settings.debounce.touch_policy,
        proxy_label,
    ) {
        Ok(reconciler) => reconciler,
        Err(e) => {
            error!(error = %e, "리컨사일러 생성 실패");
            std::process::exit(1);
        }
    };

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let supervisor = ConnectionSupervisor::new(client.clone(), endpoint, settings.docker.reconnect_interval());
    let supervisor_tx = event_tx.clone();
    let supervisor_shutdown = shutdown_rx.clone();
    let supervisor_handle = tokio::spawn(async move {
        supervisor.run(supervisor_tx, supervisor_shutdown).await;
    });

    if let Some(period) = settings.docker.poll_interval() {
        let poller = ContainerPoller::new(client.clone(), period);
        let poller_tx = event_tx.clone();
        let poller_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            poller.run(poller_tx, poller_shutdown).await;
        });
    }
    // 송신측은 감시 태스크들만 보유
    drop(event_tx);

    let _cert_watcher = if extension.watch_certs {
        match CertWatcher::start(&extension.ssl_cert_dir, reconciler.cache()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(path = %extension.ssl_cert_dir.display(), error = %e, "인증서 감시 시작 실패");
                None
            }
        }
    } else {
        None
    };

    let reconciler_handle = tokio::spawn(reconciler.run(event_rx));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("종료 시그널 수신"),
        Err(e) => error!(error = %e, "시그널 대기 실패"),
    }
    let _ = shutdown_tx.send(true);

    if let Err(e) = supervisor_handle.await {
        error!(error = %e, "이벤트 감시 태스크 비정상 종료");
    }
    if let Err(e) = reconciler_handle.await {
        error!(error = %e, "리컨사일러 태스크 비정상 종료");
    }

    info!("reverse-proxy-sync 종료");
}
