use std::path::Path;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher};
use tracing::{debug, error, info};

use crate::pipeline::{ReloadCache, RELOAD_KEY};

/// 인증서 디렉토리 감시. 파일이 생성/수정/삭제되면 리로드를 예약합니다.
pub struct CertWatcher {
    // drop 되면 감시가 중단됨
    _watcher: RecommendedWatcher,
}

impl CertWatcher {
    pub fn start(path: &Path, cache: ReloadCache) -> NotifyResult<Self> {
        let mut watcher = notify::recommended_watcher(move |res: NotifyResult<Event>| match res {
            Ok(event) => {
                if is_relevant(&event.kind) {
                    debug!(paths = ?event.paths, kind = ?event.kind, "인증서 변경 감지");
                    cache.set(RELOAD_KEY, true);
                }
            }
            Err(e) => error!(error = %e, "인증서 감시 오류"),
        })?;

        watcher.watch(path, RecursiveMode::Recursive)?;
        info!(path = %path.display(), "인증서 디렉토리 감시 시작");

        Ok(Self { _watcher: watcher })
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}
