use std::collections::HashMap;
use bollard::models::{EventMessage, EventMessageTypeEnum};

/// 파이프라인으로 전달되는 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyEvent {
    /// (재)연결 성공. 끊겨 있던 동안 놓친 이벤트가 있을 수 있으므로 전체 재구성이 필요함
    EngineStart,
    /// 감시 종료
    EngineStop,
    /// 컨테이너 라이프사이클 이벤트
    Container {
        id: String,
        action: String,
        /// 이벤트 actor 속성 (컨테이너 라벨 포함)
        attributes: HashMap<String, String>,
    },
    /// 폴링으로 실행 중인 컨테이너 집합 변화를 감지함
    Poll {
        running: usize,
    },
}

impl ProxyEvent {
    /// 컨테이너 이벤트만 변환합니다. 그 외 타입은 None.
    pub fn from_message(message: &EventMessage) -> Option<Self> {
        if message.typ != Some(EventMessageTypeEnum::CONTAINER) {
            return None;
        }

        let actor = message.actor.as_ref()?;
        let id = actor.id.clone()?;
        let action = message.action.clone().unwrap_or_default();

        Some(ProxyEvent::Container {
            id,
            action,
            attributes: actor.attributes.clone().unwrap_or_default(),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            ProxyEvent::EngineStart => "engine-start",
            ProxyEvent::EngineStop => "engine-stop",
            ProxyEvent::Container { action, .. } => action,
            ProxyEvent::Poll { .. } => "poll",
        }
    }
}
