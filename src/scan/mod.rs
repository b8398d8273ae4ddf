//! Scan session state shared between the scanning producer and bake workers.
//!
//! The producer applies [`ScanEvent`]s to a [`ScanSession`]; a bake takes a
//! [`ScanSnapshot`] under one read lock and works on that. Fragments and
//! captures are held behind `Arc`, so a snapshot copies references, and an
//! update swaps a fragment wholesale. A concurrent update therefore never
//! produces a torn merged mesh.
//!
//! # Example
//!
//! ```
//! use atlasbake::scan::{ScanEvent, ScanSession};
//! use atlasbake::mesh::MeshFragment;
//! use nalgebra::{Matrix4, Point3, Vector3};
//! use uuid::Uuid;
//!
//! let session = ScanSession::new();
//! session.apply(ScanEvent::Added(MeshFragment::new(
//!     Uuid::new_v4(),
//!     Matrix4::identity(),
//!     vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
//!     vec![Vector3::z(); 3],
//!     vec![[0, 1, 2]],
//! )));
//!
//! let snapshot = session.snapshot();
//! assert_eq!(snapshot.merge().unwrap().num_vertices(), 3);
//! ```

mod capture;
mod manifest;
mod store;

pub use capture::{Capture, CaptureBuffer, CaptureOptions, CaptureOutcome};
pub use manifest::{CaptureEntry, FragmentEntry, ReplaySummary, ScanManifest};
pub use store::FragmentStore;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::IntegrityError;
use crate::mesh::{merge, AnchorId, MergedMesh, MeshFragment};

/// An observation from the scanning session.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A new anchor was observed.
    Added(MeshFragment),
    /// An anchor was re-observed; its fragment replaces the previous one.
    Updated(MeshFragment),
    /// An anchor was lost.
    Removed(AnchorId),
    /// A camera frame was sampled.
    Captured(Capture),
}

/// Effect of applying a [`ScanEvent`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanEffect {
    /// A fragment was stored; `replaced` is true if the anchor already existed.
    FragmentStored {
        /// Whether a previous fragment was replaced.
        replaced: bool,
    },
    /// A removal was processed; `existed` is false for unknown anchors.
    FragmentRemoved {
        /// Whether the anchor was present.
        existed: bool,
    },
    /// A capture was offered to the capture buffer.
    Capture(CaptureOutcome),
}

#[derive(Debug, Default)]
struct ScanState {
    fragments: FragmentStore,
    captures: CaptureBuffer,
}

/// Thread-safe owner of the fragment store and capture buffer.
#[derive(Debug, Default)]
pub struct ScanSession {
    state: RwLock<ScanState>,
}

impl ScanSession {
    /// Create an empty session with default capture spacing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session with custom capture options.
    pub fn with_capture_options(options: CaptureOptions) -> Self {
        Self {
            state: RwLock::new(ScanState {
                fragments: FragmentStore::new(),
                captures: CaptureBuffer::with_options(options),
            }),
        }
    }

    // State is only ever replaced wholesale, so a panic in another holder
    // cannot leave it half-written.
    fn read(&self) -> RwLockReadGuard<'_, ScanState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ScanState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one scan event.
    pub fn apply(&self, event: ScanEvent) -> ScanEffect {
        match event {
            ScanEvent::Added(fragment) | ScanEvent::Updated(fragment) => {
                let id = fragment.id;
                let replaced = self.write().fragments.upsert(fragment).is_some();
                log::debug!(
                    "{} fragment {}",
                    if replaced { "Replaced" } else { "Added" },
                    id
                );
                ScanEffect::FragmentStored { replaced }
            }
            ScanEvent::Removed(id) => {
                let existed = self.write().fragments.remove(&id).is_some();
                if !existed {
                    log::debug!("Removal of unknown fragment {}", id);
                }
                ScanEffect::FragmentRemoved { existed }
            }
            ScanEvent::Captured(capture) => ScanEffect::Capture(self.add_capture(capture)),
        }
    }

    /// Insert or replace a fragment, returning whether one was replaced.
    pub fn upsert_fragment(&self, fragment: MeshFragment) -> bool {
        matches!(
            self.apply(ScanEvent::Updated(fragment)),
            ScanEffect::FragmentStored { replaced: true }
        )
    }

    /// Remove a fragment, returning whether it existed.
    pub fn remove_fragment(&self, id: &AnchorId) -> bool {
        self.write().fragments.remove(id).is_some()
    }

    /// Offer a capture. Captures are ignored while there is no geometry.
    pub fn add_capture(&self, capture: Capture) -> CaptureOutcome {
        let mut state = self.write();
        if state.fragments.is_empty() {
            log::debug!("Ignoring capture at t={:.3}s: no fragments yet", capture.timestamp);
            return CaptureOutcome::NoGeometry;
        }
        let timestamp = capture.timestamp;
        let outcome = state.captures.push(capture);
        match outcome {
            CaptureOutcome::TooSoon { previous } => log::warn!(
                "Rejected capture at t={:.3}s: previous capture at t={:.3}s is closer than {:.3}s",
                timestamp,
                previous,
                state.captures.options().min_interval
            ),
            CaptureOutcome::InvalidTimestamp => {
                log::warn!("Rejected capture with non-finite timestamp {}", timestamp)
            }
            _ => {}
        }
        outcome
    }

    /// Number of fragments.
    pub fn num_fragments(&self) -> usize {
        self.read().fragments.len()
    }

    /// Number of accepted captures.
    pub fn num_captures(&self) -> usize {
        self.read().captures.len()
    }

    /// Take a consistent snapshot of fragments and captures.
    pub fn snapshot(&self) -> ScanSnapshot {
        let state = self.read();
        ScanSnapshot {
            fragments: state.fragments.clone(),
            captures: state.captures.captures().to_vec(),
        }
    }

    /// Drop all fragments and captures.
    pub fn reset(&self) {
        let mut state = self.write();
        state.fragments.clear();
        state.captures.clear();
    }
}

/// An immutable view of a session at one instant.
#[derive(Debug, Clone, Default)]
pub struct ScanSnapshot {
    fragments: FragmentStore,
    captures: Vec<Arc<Capture>>,
}

impl ScanSnapshot {
    /// Build a snapshot directly from its parts.
    pub fn new(fragments: FragmentStore, captures: Vec<Arc<Capture>>) -> Self {
        Self {
            fragments,
            captures,
        }
    }

    /// The fragments.
    pub fn fragments(&self) -> &FragmentStore {
        &self.fragments
    }

    /// The captures, oldest first.
    pub fn captures(&self) -> &[Arc<Capture>] {
        &self.captures
    }

    /// Whether there are no fragments.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Merge the snapshot's fragments.
    pub fn merge(&self) -> Result<MergedMesh, IntegrityError> {
        merge(self.fragments.iter())
    }

    /// A copy of this snapshot without one fragment.
    ///
    /// Used to retry after a merge names an offending fragment.
    pub fn without_fragment(&self, id: &AnchorId) -> ScanSnapshot {
        let mut fragments = self.fragments.clone();
        fragments.remove(id);
        ScanSnapshot {
            fragments,
            captures: self.captures.clone(),
        }
    }
}
