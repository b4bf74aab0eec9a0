//! 컨테이너 메타데이터로부터 라우팅 모델을 만드는 모듈입니다.

mod error;
mod descriptor;
mod labels;
mod model;
mod builder;

pub use error::RoutingError;
pub use descriptor::{ContainerDescriptor, PublishedPort};
pub use labels::{EnvLabelSource, LabelKey, LabelSource, PrefixedLabels};
pub use model::{RoutingModel, SslVerify, UpstreamServer, VirtualHost};
pub use builder::{domain_key, RoutingModelBuilder, DEFAULT_BALANCE_ALGORITHM, DEFAULT_CHECK_INTERVAL_MS};
