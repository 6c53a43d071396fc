//! # Fault Injection
//!
//! Fixed checkpoints in the write/commit pipeline where tests can stop
//! execution deterministically and then verify recovery.
//!
//! A checkpoint that fires returns `RdgError::FaultInjected` to the pipeline,
//! which aborts the commit exactly as a real failure at that point would.
//! Plans are one-shot: once a fault fires the injector disarms itself so the
//! retried commit runs to completion.

use crate::RdgError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// CHECKPOINTS
// =============================================================================

/// How disruptive a failure at a checkpoint is.
///
/// `High` checkpoints sit inside the commit protocol proper (after local
/// writes were issued); `Normal` ones sit in the write-issuing phase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum FaultSensitivity {
    /// Write-issuing phase.
    #[default]
    Normal,
    /// Commit protocol phase.
    High,
}

/// A named checkpoint in the store pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPoint {
    /// Before a blob write is handed to the write group.
    BeforeStartStore,
    /// After a blob write was handed to the write group.
    AfterStartStore,
    /// After every dirty column of a table was enqueued.
    AfterColumnWrites,
    /// Before the partition header is serialized and enqueued.
    BeforeHeaderWrite,
    /// After the partition header was enqueued.
    AfterHeaderWrite,
    /// Before waiting for the write group.
    BeforeFinish,
    /// After every write of the group is durable.
    AfterFinish,
    /// Before hosts exchange their local outcomes.
    BeforeBarrier,
    /// After every host reported local success.
    AfterBarrier,
    /// Before the naming service compare-and-update.
    BeforeNamingUpdate,
    /// After the naming service accepted the new version.
    AfterNamingUpdate,
    /// Before the leader writes the metadata-pointer file.
    BeforeMetaWrite,
    /// After the leader wrote the metadata-pointer file.
    AfterMetaWrite,
}

impl FaultPoint {
    /// Every checkpoint, in pipeline order.
    pub const ALL: [Self; 13] = [
        Self::BeforeStartStore,
        Self::AfterStartStore,
        Self::AfterColumnWrites,
        Self::BeforeHeaderWrite,
        Self::AfterHeaderWrite,
        Self::BeforeFinish,
        Self::AfterFinish,
        Self::BeforeBarrier,
        Self::AfterBarrier,
        Self::BeforeNamingUpdate,
        Self::AfterNamingUpdate,
        Self::BeforeMetaWrite,
        Self::AfterMetaWrite,
    ];

    /// Sensitivity class of this checkpoint.
    #[must_use]
    pub const fn sensitivity(self) -> FaultSensitivity {
        match self {
            Self::BeforeStartStore
            | Self::AfterStartStore
            | Self::AfterColumnWrites
            | Self::BeforeHeaderWrite
            | Self::AfterHeaderWrite => FaultSensitivity::Normal,
            Self::BeforeFinish
            | Self::AfterFinish
            | Self::BeforeBarrier
            | Self::AfterBarrier
            | Self::BeforeNamingUpdate
            | Self::AfterNamingUpdate
            | Self::BeforeMetaWrite
            | Self::AfterMetaWrite => FaultSensitivity::High,
        }
    }

    /// True if a fault here leaves the previous version as the latest one.
    #[must_use]
    pub const fn precedes_publication(self) -> bool {
        !matches!(
            self,
            Self::AfterNamingUpdate | Self::BeforeMetaWrite | Self::AfterMetaWrite
        )
    }
}

// =============================================================================
// PLANS
// =============================================================================

/// When the injector fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FaultPlan {
    /// Never fire.
    #[default]
    Never,
    /// Fire the first time execution reaches `point`.
    AtPoint {
        /// Target checkpoint.
        point: FaultPoint,
    },
    /// Fire at the `count`-th (1-based) checkpoint whose sensitivity is at
    /// least `sensitivity`.
    AfterCount {
        /// 1-based ordinal of the checkpoint to fail.
        count: u64,
        /// Minimum sensitivity of counted checkpoints.
        sensitivity: FaultSensitivity,
    },
}

/// Most recent checkpoints kept by `FaultInjector::hits`.
pub const MAX_RECORDED_HITS: usize = 1024;

/// Shared fault injector consulted at every checkpoint.
#[derive(Debug, Default)]
pub struct FaultInjector {
    plan: Mutex<FaultPlan>,
    counted: AtomicU64,
    hits: Mutex<VecDeque<FaultPoint>>,
    fired: Mutex<Option<FaultPoint>>,
}

impl FaultInjector {
    /// Create an injector with the given plan.
    #[must_use]
    pub fn new(plan: FaultPlan) -> Self {
        Self {
            plan: Mutex::new(plan),
            ..Self::default()
        }
    }

    /// Replace the plan and reset counters and recorded hits.
    pub fn arm(&self, plan: FaultPlan) {
        *self.plan.lock() = plan;
        self.counted.store(0, Ordering::SeqCst);
        self.hits.lock().clear();
        *self.fired.lock() = None;
    }

    /// Stop firing.
    pub fn disarm(&self) {
        *self.plan.lock() = FaultPlan::Never;
    }

    /// Pass a checkpoint. Returns `Err(FaultInjected)` if the plan fires here.
    pub fn check(&self, point: FaultPoint) -> Result<(), RdgError> {
        {
            let mut hits = self.hits.lock();
            if hits.len() == MAX_RECORDED_HITS {
                hits.pop_front();
            }
            hits.push_back(point);
        }

        let mut plan = self.plan.lock();
        let fire = match *plan {
            FaultPlan::Never => false,
            FaultPlan::AtPoint { point: target } => target == point,
            FaultPlan::AfterCount { count, sensitivity } => {
                if point.sensitivity() >= sensitivity {
                    let seen = self.counted.fetch_add(1, Ordering::SeqCst) + 1;
                    seen == count
                } else {
                    false
                }
            }
        };

        if fire {
            *plan = FaultPlan::Never;
            *self.fired.lock() = Some(point);
            tracing::warn!(?point, "fault injected");
            return Err(RdgError::FaultInjected(point));
        }
        Ok(())
    }

    /// Checkpoints passed since the last `arm`, in order; only the latest
    /// `MAX_RECORDED_HITS` are kept.
    #[must_use]
    pub fn hits(&self) -> Vec<FaultPoint> {
        self.hits.lock().iter().copied().collect()
    }

    /// The checkpoint where the last armed plan fired, if it did.
    #[must_use]
    pub fn fired(&self) -> Option<FaultPoint> {
        *self.fired.lock()
    }
}

// =============================================================================
// TESTS
// =============================================================================
