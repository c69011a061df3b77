//! Concurrent run limits: one global pool plus one pool per workflow.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use strand_core::config::AdmissionConfig;
use strand_core::error::{Result, StrandError};

/// Held for the lifetime of an admitted run. Dropping it frees both slots.
#[derive(Debug)]
pub struct AdmissionPermit {
    _workflow: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

pub struct Admission {
    global: Arc<Semaphore>,
    per_workflow: Mutex<HashMap<String, Arc<Semaphore>>>,
    per_workflow_limit: usize,
}

impl Admission {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            global: Arc::new(Semaphore::new(config.effective_global_max())),
            per_workflow: Mutex::new(HashMap::new()),
            per_workflow_limit: config.effective_per_workflow(),
        }
    }

    /// Free global slots.
    pub fn available(&self) -> usize {
        self.global.available_permits()
    }

    async fn workflow_pool(&self, workflow: &str) -> Arc<Semaphore> {
        let mut pools = self.per_workflow.lock().await;
        Arc::clone(
            pools
                .entry(workflow.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_workflow_limit))),
        )
    }

    /// Wait for a global slot, then a slot for `workflow`.
    ///
    /// Cancellation while waiting releases anything already taken.
    pub async fn acquire(&self, workflow: &str, cancel: &CancellationToken) -> Result<AdmissionPermit> {
        let global = tokio::select! {
            permit = Arc::clone(&self.global).acquire_owned() => permit.map_err(|_| closed())?,
            _ = cancel.cancelled() => return Err(StrandError::Cancelled),
        };
        let pool = self.workflow_pool(workflow).await;
        let local = tokio::select! {
            permit = pool.acquire_owned() => permit.map_err(|_| closed())?,
            _ = cancel.cancelled() => return Err(StrandError::Cancelled),
        };
        debug!(workflow = %workflow, available = self.available(), "Run admitted");
        Ok(AdmissionPermit {
            _workflow: local,
            _global: global,
        })
    }

    /// Admit without waiting, if both pools have room.
    pub async fn try_acquire(&self, workflow: &str) -> Option<AdmissionPermit> {
        let global = Arc::clone(&self.global).try_acquire_owned().ok()?;
        let local = self.workflow_pool(workflow).await.try_acquire_owned().ok()?;
        Some(AdmissionPermit {
            _workflow: local,
            _global: global,
        })
    }

    /// Refuse all further admissions; waiters fail with `AdmissionClosed`.
    pub fn close(&self) {
        self.global.close();
    }
}

fn closed() -> StrandError {
    StrandError::AdmissionClosed("admission is closed".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn admission(global_max: usize, per_workflow: usize) -> Admission {
        Admission::new(&AdmissionConfig {
            global_max,
            per_workflow,
        })
    }

    #[tokio::test]
    async fn per_workflow_limit() {
        let adm = admission(10, 1);
        let held = adm.try_acquire("wf").await.unwrap();
        assert!(adm.try_acquire("wf").await.is_none());
        assert!(adm.try_acquire("other").await.is_some());
        drop(held);
        assert!(adm.try_acquire("wf").await.is_some());
    }

    #[tokio::test]
    async fn global_limit() {
        let adm = admission(1, 3);
        let _held = adm.try_acquire("a").await.unwrap();
        assert!(adm.try_acquire("b").await.is_none());
        assert_eq!(adm.available(), 0);
    }

    #[tokio::test]
    async fn rejected_workflow_slot_returns_global_slot() {
        let adm = admission(2, 1);
        let _held = adm.try_acquire("wf").await.unwrap();
        assert!(adm.try_acquire("wf").await.is_none());
        assert_eq!(adm.available(), 1);
    }

    #[tokio::test]
    async fn cancelled_wait_releases_global_slot() {
        let adm = admission(5, 1);
        let _held = adm.acquire("wf", &CancellationToken::new()).await.unwrap();
        assert_eq!(adm.available(), 4);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = adm.acquire("wf", &cancel).await.unwrap_err();
        assert!(matches!(err, StrandError::Cancelled));
        assert_eq!(adm.available(), 4);
    }

    #[tokio::test]
    async fn closed_admission() {
        let adm = admission(1, 1);
        adm.close();
        let err = adm.acquire("wf", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, StrandError::AdmissionClosed(_)));
    }

    #[test]
    fn zero_limits_use_defaults() {
        let adm = admission(0, 0);
        assert_eq!(adm.available(), 10);
        assert_eq!(adm.per_workflow_limit, 3);
    }
}
