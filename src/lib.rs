//! Docker 컨테이너 라벨을 읽어 HAProxy/Nginx 설정을 생성하고 프록시를 리로드합니다.
//!
//! # 흐름
//!
//! - [`docker::ConnectionSupervisor`]가 Docker 이벤트를 구독하고 연결이 끊기면 다시 연결
//! - [`pipeline::Reconciler`]가 이벤트를 디바운스해서 리로드 사이클 하나로 합침
//! - [`routing::RoutingModelBuilder`]가 실행 중인 컨테이너로 라우팅 모델을 생성
//! - [`render::ConfigRenderer`]가 모델을 설정 파일로 렌더링
//! - [`reload::ReloadOrchestrator`]가 실행 중인 프록시에 설정을 적용
//!
//! # 라벨 예제
//!
//! ```text
//! rproxy.hostname=api
//! rproxy.domain=example.com
//! rproxy.port=8080
//! rproxy.alias_domain.0=api.example.org
//! rproxy.health_check=GET /health
//! ```

pub mod cache;
pub mod docker;
pub mod logging;
pub mod pipeline;
pub mod reload;
pub mod render;
pub mod routing;
pub mod settings;
pub mod watcher;
