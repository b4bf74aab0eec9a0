//! 키/TTL 기반 병합 캐시.
//!
//! 같은 키에 대한 `set`이 TTL 안에 여러 번 들어와도 만료 콜백은 한 번만 호출됩니다.
//! 리로드 디바운스에 사용합니다: 이벤트마다 `set("reload", true)`를 호출하고,
//! 조용한 구간이 지나면 콜백이 파이프라인을 깨웁니다.
//!
//! 만료 시각 기준 최소 힙을 유지하므로 리퍼 태스크는 다음 만료 시각까지만 잠듭니다.

mod error;

pub use error::CacheError;

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

/// 리로드 폭주를 막기 위한 TTL 하한
pub const MIN_TTL: Duration = Duration::from_millis(100);

/// 만료 콜백. 캐시 잠금 밖에서 호출됩니다.
pub type ExpireCallback<K, V> = Arc<dyn Fn(K, V) + Send + Sync>;

/// 이미 존재하는 키에 `set` 했을 때의 타이머 처리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchPolicy {
    /// 만료 시각을 now + TTL로 미룸 (조용해질 때까지 대기)
    #[default]
    Reset,
    /// 처음 잡힌 만료 시각 유지 (고정 구간)
    Preserve,
}

impl std::str::FromStr for TouchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reset" => Ok(TouchPolicy::Reset),
            "preserve" => Ok(TouchPolicy::Preserve),
            _ => Err(format!("Invalid touch policy: {}", s)),
        }
    }
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    last_touch: Instant,
    deadline: Instant,
    generation: u64,
}

/// 힙 레코드. 엔트리의 generation과 다르면 오래된 레코드로 보고 버립니다.
struct Scheduled<K> {
    deadline: Instant,
    generation: u64,
    key: K,
}

impl<K> PartialEq for Scheduled<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl<K> Eq for Scheduled<K> {}

impl<K> PartialOrd for Scheduled<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Scheduled<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.generation.cmp(&other.generation))
    }
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    heap: BinaryHeap<Reverse<Scheduled<K>>>,
    /// 진행 중인 작업 때문에 만료가 보류된 키
    deferred: Vec<K>,
    pending: usize,
    next_generation: u64,
    closed: bool,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn schedule(&mut self, key: K, deadline: Instant, generation: u64) {
        self.heap.push(Reverse(Scheduled { deadline, generation, key }));
    }

    fn take_expired(&mut self, now: Instant) -> Vec<(K, V)> {
        let mut expired = Vec::new();

        while let Some(Reverse(top)) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Some(Reverse(scheduled)) = self.heap.pop() else { break };

            let current = matches!(
                self.entries.get(&scheduled.key),
                Some(entry) if entry.generation == scheduled.generation
            );
            if !current {
                continue;
            }

            if self.pending > 0 {
                self.deferred.push(scheduled.key);
                continue;
            }

            if let Some(entry) = self.entries.remove(&scheduled.key) {
                trace!(
                    idle_ms = now.saturating_duration_since(entry.last_touch).as_millis() as u64,
                    "캐시 엔트리 만료"
                );
                expired.push((scheduled.key, entry.value));
            }
        }

        expired
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(top)| top.deadline)
    }

    /// 보류된 키를 즉시 만료되도록 다시 예약
    fn release_deferred(&mut self, now: Instant) -> bool {
        if self.deferred.is_empty() {
            return false;
        }
        let keys: Vec<K> = self.deferred.drain(..).collect();
        for key in keys {
            let generation = self.bump_generation();
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.generation = generation;
                entry.deadline = now;
                self.schedule(key, now, generation);
            }
        }
        true
    }
}

struct Shared<K, V> {
    inner: Mutex<Inner<K, V>>,
    wake: Notify,
    ttl: Duration,
    policy: TouchPolicy,
    on_expire: ExpireCallback<K, V>,
}

impl<K, V> Shared<K, V> {
    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// TTL 기반 병합 캐시. 복제본은 같은 저장소를 공유합니다.
pub struct CoalescingCache<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for CoalescingCache<K, V> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<K, V> CoalescingCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// 캐시를 만들고 리퍼 태스크를 띄웁니다. tokio 런타임 안에서 호출해야 합니다.
    pub fn new(ttl: Duration, policy: TouchPolicy, on_expire: ExpireCallback<K, V>) -> Result<Self, CacheError> {
        if ttl < MIN_TTL {
            return Err(CacheError::TtlTooShort { ttl, min: MIN_TTL });
        }

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                heap: BinaryHeap::new(),
                deferred: Vec::new(),
                pending: 0,
                next_generation: 0,
                closed: false,
            }),
            wake: Notify::new(),
            ttl,
            policy,
            on_expire,
        });

        tokio::spawn(Self::reap(shared.clone()));
        debug!(ttl_ms = ttl.as_millis() as u64, policy = ?policy, "병합 캐시 시작");

        Ok(Self { shared })
    }

    /// 키가 없으면 삽입하고 now + TTL에 만료를 예약합니다.
    /// 키가 있으면 값을 바꾸고 정책에 따라 타이머를 갱신하거나 유지합니다. 콜백은 호출하지 않습니다.
    pub fn set(&self, key: K, value: V) {
        let now = Instant::now();
        let deadline = now + self.shared.ttl;
        {
            let mut inner = self.shared.lock();
            if inner.closed {
                return;
            }
            let generation = inner.bump_generation();

            match inner.entries.get_mut(&key) {
                Some(entry) => {
                    entry.value = value;
                    entry.last_touch = now;
                    if self.shared.policy == TouchPolicy::Preserve {
                        return;
                    }
                    entry.deadline = deadline;
                    entry.generation = generation;
                }
                None => {
                    inner.entries.insert(key.clone(), CacheEntry {
                        value,
                        last_touch: now,
                        deadline,
                        generation,
                    });
                }
            }
            inner.schedule(key, deadline, generation);
        }
        self.shared.wake.notify_one();
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.shared.lock().entries.get(key).map(|entry| entry.value.clone())
    }

    /// 키의 남은 시간 (만료가 보류된 경우 0)
    pub fn remaining(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        self.shared
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.deadline.saturating_duration_since(now))
    }

    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 진행 중 작업 카운터를 올립니다. 가드가 모두 해제되기 전에는 만료 콜백이 보류됩니다.
    pub fn begin_work(&self) -> WorkGuard<K, V> {
        self.shared.lock().pending += 1;
        WorkGuard { shared: self.shared.clone() }
    }

    pub fn pending_work(&self) -> usize {
        self.shared.lock().pending
    }

    /// 리퍼를 멈춥니다. 남은 엔트리는 콜백 없이 버려집니다.
    pub fn close(&self) {
        {
            let mut inner = self.shared.lock();
            inner.closed = true;
            inner.entries.clear();
            inner.heap.clear();
            inner.deferred.clear();
        }
        self.shared.wake.notify_one();
    }

    async fn reap(shared: Arc<Shared<K, V>>) {
        loop {
            let (expired, next) = {
                let mut inner = shared.lock();
                if inner.closed {
                    break;
                }
                let expired = inner.take_expired(Instant::now());
                (expired, inner.next_deadline())
            };

            // 콜백 안에서 set을 호출해도 교착되지 않도록 잠금 밖에서 호출
            for (key, value) in expired {
                (shared.on_expire)(key, value);
            }

            match next {
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => {}
                        _ = shared.wake.notified() => {}
                    }
                }
                None => shared.wake.notified().await,
            }
        }
        debug!("병합 캐시 리퍼 종료");
    }
}

/// 진행 중 작업 가드. drop 시 카운터를 내립니다.
pub struct WorkGuard<K: Eq + Hash + Clone, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K: Eq + Hash + Clone, V> Drop for WorkGuard<K, V> {
    fn drop(&mut self) {
        let released = {
            let mut inner = self.shared.lock();
            inner.pending = inner.pending.saturating_sub(1);
            inner.pending == 0 && inner.release_deferred(Instant::now())
        };
        if released {
            self.shared.wake.notify_one();
        }
    }
}
