//! # Host Communication
//!
//! The commit protocol runs SPMD: every host of a partitioned graph executes
//! the same `store` call on its own partition. Hosts coordinate only through
//! collective status exchanges: every host's outcome (`all_ok`) or the
//! leader's outcome (`broadcast_status`).
//!
//! A host that fails locally must still take part in every exchange up to
//! the point where the group learns of the failure, otherwise the other
//! hosts wait forever.
//!
//! `LocalComm` simulates a group of hosts inside one process, each host
//! driven by its own task.

use crate::RdgError;
use crate::primitives::LEADER_HOST;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Barrier;

/// Outcome of a leader-only step, as seen by every host.
pub type LeaderStatus = Result<(), String>;

/// Collective operations across the hosts of one graph.
#[async_trait]
pub trait CommBackend: Send + Sync + fmt::Debug {
    /// This host's id, in `0..num()`.
    fn id(&self) -> u32;

    /// Number of hosts.
    fn num(&self) -> u32;

    /// Collective: every host passes its local outcome and gets `Ok` only if
    /// every host succeeded, otherwise the first failure reported.
    async fn all_ok(&self, local: LeaderStatus) -> LeaderStatus;

    /// Collective: every host gets the status passed by the leader.
    /// Statuses passed by other hosts are ignored.
    async fn broadcast_status(&self, status: LeaderStatus) -> LeaderStatus;
}

/// Run `f` on the leader host only and give every host its outcome.
///
/// The leader gets its own error back unchanged; the other hosts get
/// `LeaderFailed`. Every host must call this, since the broadcast is
/// collective.
pub async fn one_host_only<F, Fut>(comm: &dyn CommBackend, f: F) -> Result<(), RdgError>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<(), RdgError>> + Send,
{
    let mut local_error = None;
    let status = if comm.id() == LEADER_HOST {
        match f().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                local_error = Some(e);
                Err(msg)
            }
        }
    } else {
        Ok(())
    };

    let shared = comm.broadcast_status(status).await;
    match (local_error, shared) {
        (Some(e), _) => Err(e),
        (None, Ok(())) => Ok(()),
        (None, Err(msg)) => Err(RdgError::LeaderFailed(msg)),
    }
}

/// Share a local outcome with every host.
///
/// A host that failed gets its own error back; the others get `HostFailed`
/// naming the first host that failed. Every host must call this.
pub async fn exchange<T>(
    comm: &dyn CommBackend,
    local: Result<T, RdgError>,
) -> Result<T, RdgError> {
    let shared = comm
        .all_ok(local.as_ref().map(|_| ()).map_err(ToString::to_string))
        .await;
    let value = local?;
    shared.map_err(|msg| {
        tracing::warn!(host = comm.id(), failure = %msg, "another host failed");
        RdgError::HostFailed(msg)
    })?;
    Ok(value)
}

// =============================================================================
// IN-PROCESS GROUP
// =============================================================================

#[derive(Debug)]
struct Shared {
    num: u32,
    barrier: Barrier,
    status: Mutex<LeaderStatus>,
    outcome: Mutex<LeaderStatus>,
}

/// One host of an in-process host group.
#[derive(Debug, Clone)]
pub struct LocalComm {
    id: u32,
    shared: Arc<Shared>,
}

impl LocalComm {
    /// A group of one host.
    #[must_use]
    pub fn single() -> Self {
        Self::group(1).remove(0)
    }

    /// A group of `num` hosts (at least one), indexed by host id.
    #[must_use]
    pub fn group(num: u32) -> Vec<Self> {
        let num = num.max(1);
        let shared = Arc::new(Shared {
            num,
            barrier: Barrier::new(num as usize),
            status: Mutex::new(Ok(())),
            outcome: Mutex::new(Ok(())),
        });
        (0..num)
            .map(|id| Self {
                id,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

#[async_trait]
impl CommBackend for LocalComm {
    fn id(&self) -> u32 {
        self.id
    }

    fn num(&self) -> u32 {
        self.shared.num
    }

    async fn all_ok(&self, local: LeaderStatus) -> LeaderStatus {
        if let Err(msg) = local {
            let mut outcome = self.shared.outcome.lock();
            if outcome.is_ok() {
                *outcome = Err(format!("host {}: {msg}", self.id));
            }
        }
        self.shared.barrier.wait().await;
        let out = self.shared.outcome.lock().clone();
        if self.shared.barrier.wait().await.is_leader() {
            *self.shared.outcome.lock() = Ok(());
        }
        // the reset must land before any host starts the next exchange
        self.shared.barrier.wait().await;
        out
    }

    async fn broadcast_status(&self, status: LeaderStatus) -> LeaderStatus {
        if self.id == LEADER_HOST {
            *self.shared.status.lock() = status;
        }
        self.shared.barrier.wait().await;
        let out = self.shared.status.lock().clone();
        // nobody may overwrite the slot before every host has read it
        self.shared.barrier.wait().await;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn single_host_runs_leader_step() {
        let comm = LocalComm::single();
        assert_eq!((comm.id(), comm.num()), (0, 1));
        let result = one_host_only(&comm, || async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn leader_step_runs_once_per_group() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut tasks = Vec::new();
        for comm in LocalComm::group(4) {
            let runs = Arc::clone(&runs);
            tasks.push(tokio::spawn(async move {
                one_host_only(&comm, || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for task in tasks {
            task.await.expect("join").expect("leader step");
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn any_host_failure_reaches_every_host() {
        let mut tasks = Vec::new();
        for comm in LocalComm::group(3) {
            tasks.push(tokio::spawn(async move {
                let local = if comm.id() == 2 {
                    Err(RdgError::IoError("disk full".to_string()))
                } else {
                    Ok(comm.id())
                };
                let first = exchange(&comm, local).await;
                // the slot is reset, so the next round starts clean
                let second = exchange(&comm, Ok(())).await;
                (comm.id(), first, second)
            }));
        }
        for task in tasks {
            let (id, first, second) = task.await.expect("join");
            match first {
                Err(RdgError::IoError(_)) => assert_eq!(id, 2),
                Err(RdgError::HostFailed(msg)) => {
                    assert_ne!(id, 2);
                    assert!(msg.contains("host 2") && msg.contains("disk full"));
                }
                other => unreachable!("unexpected outcome {other:?}"),
            }
            assert!(second.is_ok());
        }
    }

    #[tokio::test]
    async fn leader_failure_reaches_every_host() {
        let mut tasks = Vec::new();
        for comm in LocalComm::group(3) {
            tasks.push(tokio::spawn(async move {
                let result = one_host_only(&comm, || async {
                    Err(RdgError::IoError("disk full".to_string()))
                })
                .await;
                (comm.id(), result)
            }));
        }
        for task in tasks {
            let (id, result) = task.await.expect("join");
            match result {
                Err(RdgError::IoError(_)) => assert_eq!(id, LEADER_HOST),
                Err(RdgError::LeaderFailed(msg)) => {
                    assert_ne!(id, LEADER_HOST);
                    assert!(msg.contains("disk full"));
                }
                other => unreachable!("unexpected outcome {other:?}"),
            }
        }
    }
}
