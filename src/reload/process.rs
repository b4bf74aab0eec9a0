use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::ReloadError;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 프록시 프로세스 실행/종료 확인
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// 새 설정으로 프록시를 띄우고 PID를 돌려줍니다. 기존 PID가 있으면 드레인 후 종료하도록 넘깁니다.
    async fn launch(&self, config: &Path, old_pid: Option<u32>) -> Result<u32, ReloadError>;

    /// `pid`가 종료될 때까지 대기합니다. 타임아웃은 없습니다.
    async fn wait_for_exit(&self, pid: u32) -> Result<(), ReloadError>;
}

/// `kill(pid, 0)`으로 프로세스 생존 여부 확인
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else { return false };
    // SAFETY: 시그널 0은 권한/존재 여부만 검사하고 아무것도 보내지 않음
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}

/// 실제 프록시 바이너리 (`haproxy -f <config> -sf <old pid>`)
pub struct ProxyProcess {
    binary: String,
    /// 직접 띄운 프로세스. 종료 대기 시 좀비가 남지 않도록 핸들을 보관
    children: Mutex<HashMap<u32, Child>>,
    latest: Mutex<Option<u32>>,
}

impl ProxyProcess {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            children: Mutex::new(HashMap::new()),
            latest: Mutex::new(None),
        }
    }

    fn command(&self, config: &Path, old_pid: Option<u32>) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg("-f").arg(config);
        if let Some(pid) = old_pid {
            command.arg("-sf").arg(pid.to_string());
        }
        command.stdin(Stdio::null());
        command
    }

    /// 가장 최근에 띄운 프로세스가 이미 종료됐는지 확인
    async fn latest_exit_status(&self) -> Option<String> {
        let latest = (*self.latest.lock().await)?;
        let mut children = self.children.lock().await;
        let child = children.get_mut(&latest)?;
        match child.try_wait() {
            Ok(Some(status)) => {
                children.remove(&latest);
                Some(status.to_string())
            }
            Ok(None) => None,
            Err(e) => Some(e.to_string()),
        }
    }
}

#[async_trait]
impl ProcessControl for ProxyProcess {
    async fn launch(&self, config: &Path, old_pid: Option<u32>) -> Result<u32, ReloadError> {
        let child = self.command(config, old_pid).spawn().map_err(|e| ReloadError::Launch {
            binary: self.binary.clone(),
            error: e,
        })?;

        let pid = child.id().ok_or_else(|| ReloadError::Exited {
            binary: self.binary.clone(),
            status: "PID를 확인할 수 없음".to_string(),
        })?;

        info!(binary = %self.binary, pid, old_pid = ?old_pid, "프록시 프로세스 시작");
        self.children.lock().await.insert(pid, child);
        *self.latest.lock().await = Some(pid);
        Ok(pid)
    }

    async fn wait_for_exit(&self, pid: u32) -> Result<(), ReloadError> {
        // 직접 띄운 프로세스는 try_wait으로 회수해야 좀비로 남지 않음
        let mut owned = self.children.lock().await.remove(&pid);

        loop {
            let exited = match owned.as_mut() {
                Some(child) => child.try_wait().map(|status| status.is_some()).unwrap_or(true),
                None => !is_alive(pid),
            };
            if exited {
                debug!(pid, "기존 프로세스 종료");
                return Ok(());
            }

            if let Some(status) = self.latest_exit_status().await {
                warn!(pid, status = %status, "기존 프로세스보다 새 프로세스가 먼저 종료됨");
                return Err(ReloadError::Exited {
                    binary: self.binary.clone(),
                    status,
                });
            }
            sleep(EXIT_POLL_INTERVAL).await;
        }
    }
}

/// 한 줄짜리 PID 파일
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 파일이 없거나 내용이 올바르지 않으면 None
    pub async fn read(&self) -> Result<Option<u32>, ReloadError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ReloadError::PidFile {
                    path: self.path.clone(),
                    error: e,
                })
            }
        };

        match content.trim().parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => {
                warn!(path = %self.path.display(), content = %content.trim(), "PID 파일 형식 오류, 무시함");
                Ok(None)
            }
        }
    }

    pub async fn write(&self, pid: u32) -> Result<(), ReloadError> {
        let io_error = |error| ReloadError::PidFile {
            path: self.path.clone(),
            error,
        };
        let mut file = fs::File::create(&self.path).await.map_err(io_error)?;
        file.write_all(format!("{}\n", pid).as_bytes()).await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pid_file_round_trip_and_malformed_content() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("proxy.pid"));

        assert_eq!(pid_file.read().await.unwrap(), None);

        pid_file.write(1234).await.unwrap();
        assert_eq!(std::fs::read_to_string(pid_file.path()).unwrap(), "1234\n");
        assert_eq!(pid_file.read().await.unwrap(), Some(1234));

        std::fs::write(pid_file.path(), "garbage").unwrap();
        assert_eq!(pid_file.read().await.unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_is_alive_for_current_process() {
        assert!(is_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_for_exit_reaps_owned_child() {
        let process = ProxyProcess::new("sleep");
        let mut command = Command::new("sleep");
        command.arg("0.1");
        let child = command.spawn().unwrap();
        let pid = child.id().unwrap();
        process.children.lock().await.insert(pid, child);

        process.wait_for_exit(pid).await.unwrap();
        assert!(process.children.lock().await.is_empty());
    }
}
