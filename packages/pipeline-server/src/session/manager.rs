//! Process-singleton `SessionManager` (spec §4.6).
//!
//! A `DashMap` keyed registry plus an atomic scalar for the global worker
//! budget. All map/scalar mutations are O(1) and the DashMap shard guard is
//! never held across an `.await`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use pipeline_core::TenantId;
use tracing::info;

use super::error::SessionError;
use super::orchestrator::Orchestrator;

struct SessionInfo {
    orchestrator: Option<Arc<Orchestrator>>,
    worker_count: u32,
    last_activity: Mutex<Instant>,
}

impl SessionInfo {
    fn fresh() -> Self {
        Self {
            orchestrator: None,
            worker_count: 0,
            last_activity: Mutex::new(Instant::now()),
        }
    }
}

/// Global, operational-visibility snapshot (§6.3 `server-stats`).
#[derive(Debug, Clone, Copy)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub total_workers: u32,
    pub max_workers: u32,
}

/// Process-wide registry of per-tenant orchestrators with a shared worker
/// budget, idle-eviction, and activity tracking. The one legitimate
/// process-wide singleton (spec §9 "Global state").
pub struct SessionManager {
    sessions: DashMap<TenantId, SessionInfo>,
    total_workers: AtomicU32,
    max_global_workers: u32,
    idle_timeout: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(max_global_workers: u32, idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            total_workers: AtomicU32::new(0),
            max_global_workers,
            idle_timeout,
        }
    }

    /// Creates the session if absent and refreshes its last-activity time
    /// (§6.1 "every request with a valid identifier refreshes last-activity").
    pub fn touch(&self, tenant: &TenantId) {
        let entry = self
            .sessions
            .entry(tenant.clone())
            .or_insert_with(SessionInfo::fresh);
        *entry.last_activity.lock() = Instant::now();
    }

    /// Whether admitting `requested` more workers stays within the global budget.
    #[must_use]
    pub fn can_start(&self, requested: u32) -> bool {
        self.total_workers.load(Ordering::Acquire) + requested <= self.max_global_workers
    }

    /// Registers `n` workers against `tenant` and the global total, failing
    /// with [`SessionError::CapacityExceeded`] if the budget would be exceeded.
    pub fn register_workers(&self, tenant: &TenantId, n: u32) -> Result<(), SessionError> {
        loop {
            let current = self.total_workers.load(Ordering::Acquire);
            if current + n > self.max_global_workers {
                return Err(SessionError::CapacityExceeded {
                    current,
                    requested: n,
                    limit: self.max_global_workers,
                });
            }
            if self
                .total_workers
                .compare_exchange(current, current + n, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        self.touch(tenant);
        if let Some(mut entry) = self.sessions.get_mut(tenant) {
            entry.worker_count += n;
        }
        Ok(())
    }

    /// Releases all workers currently registered to `tenant`.
    pub fn unregister_workers(&self, tenant: &TenantId) {
        if let Some(mut entry) = self.sessions.get_mut(tenant) {
            let n = entry.worker_count;
            entry.worker_count = 0;
            drop(entry);
            self.total_workers.fetch_sub(n, Ordering::AcqRel);
        }
    }

    /// The tenant's orchestrator, if one has been created.
    #[must_use]
    pub fn get_orchestrator(&self, tenant: &TenantId) -> Option<Arc<Orchestrator>> {
        self.sessions.get(tenant)?.orchestrator.clone()
    }

    /// Associates `orchestrator` with `tenant`, creating the session entry if absent.
    pub fn set_orchestrator(&self, tenant: &TenantId, orchestrator: Arc<Orchestrator>) {
        let mut entry = self
            .sessions
            .entry(tenant.clone())
            .or_insert_with(SessionInfo::fresh);
        entry.orchestrator = Some(orchestrator);
    }

    /// Stops and evicts every session whose orchestrator is not running and
    /// whose last activity exceeds the idle timeout. Returns the number of
    /// sessions evicted. Intended to be invoked periodically (§4.6
    /// recommends every 300s).
    pub async fn cleanup_idle_sessions(&self) -> usize {
        let now = Instant::now();
        let mut candidates = Vec::new();
        for entry in self.sessions.iter() {
            let idle_for = now.duration_since(*entry.last_activity.lock());
            let running = entry
                .orchestrator
                .as_ref()
                .is_some_and(|o| o.is_running());
            if idle_for >= self.idle_timeout && !running {
                candidates.push(entry.key().clone());
            }
        }

        let mut evicted = 0;
        for tenant in candidates {
            if let Some((_, info)) = self.sessions.remove(&tenant) {
                if let Some(orchestrator) = info.orchestrator {
                    orchestrator.stop().await;
                }
                self.total_workers.fetch_sub(info.worker_count, Ordering::AcqRel);
                evicted += 1;
                info!(tenant = tenant.as_str(), "evicted idle session");
            }
        }
        evicted
    }

    /// Global counts for operational visibility (§6.3 `server-stats`).
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            active_sessions: self.sessions.len(),
            total_workers: self.total_workers.load(Ordering::Acquire),
            max_workers: self.max_global_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_start_respects_global_budget() {
        let mgr = SessionManager::new(4, Duration::from_secs(1800));
        assert!(mgr.can_start(4));
        mgr.register_workers(&"t1".into(), 4).unwrap();
        assert!(!mgr.can_start(1));
    }

    #[test]
    fn register_workers_rejects_over_budget() {
        let mgr = SessionManager::new(2, Duration::from_secs(1800));
        let err = mgr.register_workers(&"t1".into(), 3).unwrap_err();
        assert!(matches!(err, SessionError::CapacityExceeded { limit: 2, .. }));
    }

    #[test]
    fn unregister_workers_frees_global_budget() {
        let mgr = SessionManager::new(2, Duration::from_secs(1800));
        let tenant: TenantId = "t1".into();
        mgr.register_workers(&tenant, 2).unwrap();
        assert!(!mgr.can_start(1));
        mgr.unregister_workers(&tenant);
        assert!(mgr.can_start(2));
    }

    #[test]
    fn stats_reports_totals() {
        let mgr = SessionManager::new(10, Duration::from_secs(1800));
        mgr.register_workers(&"t1".into(), 2).unwrap();
        mgr.register_workers(&"t2".into(), 2).unwrap();
        let stats = mgr.stats();
        assert_eq!(stats.total_workers, 4);
        assert_eq!(stats.max_workers, 10);
        assert_eq!(stats.active_sessions, 2);
    }

    #[tokio::test]
    async fn cleanup_idle_sessions_only_evicts_idle_and_stopped() {
        let mgr = SessionManager::new(10, Duration::from_millis(10));
        let tenant: TenantId = "t1".into();
        mgr.touch(&tenant);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let evicted = mgr.cleanup_idle_sessions().await;
        assert_eq!(evicted, 1);
        assert_eq!(mgr.stats().active_sessions, 0);
    }
}
