//! Recording surface sink.
//!
//! Implements the host render-surface contract in memory: every attach and
//! detach is recorded in order, current bindings are tracked per surface, and
//! individual surfaces can be made to fail.

use common::types::SurfaceId;
use room_session::errors::BindingError;
use room_session::session::{SurfaceSink, TrackRef};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// One call made to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    Attach { surface: SurfaceId, track: TrackRef },
    Detach { surface: SurfaceId, track: TrackRef },
}

#[derive(Debug, Default)]
struct SinkState {
    ops: Vec<SinkOp>,
    bindings: HashMap<SurfaceId, TrackRef>,
    fail_attach: HashSet<SurfaceId>,
    fail_detach: HashSet<SurfaceId>,
}

/// In-memory `SurfaceSink` for tests.
#[derive(Debug, Default)]
pub struct RecordingSurfaceSink {
    state: Mutex<SinkState>,
}

impl RecordingSurfaceSink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every attach to `surface` fail.
    pub fn fail_attach_on(&self, surface: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_attach
            .insert(SurfaceId::from(surface));
    }

    /// Make every detach from `surface` fail.
    pub fn fail_detach_on(&self, surface: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_detach
            .insert(SurfaceId::from(surface));
    }

    /// Stop failing.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_attach.clear();
        state.fail_detach.clear();
    }

    /// All calls so far, in order.
    #[must_use]
    pub fn ops(&self) -> Vec<SinkOp> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Track currently shown on `surface`.
    #[must_use]
    pub fn bound_track(&self, surface: &str) -> Option<TrackRef> {
        self.state
            .lock()
            .unwrap()
            .bindings
            .get(&SurfaceId::from(surface))
            .cloned()
    }

    /// Number of surfaces currently showing a track.
    #[must_use]
    pub fn active_bindings(&self) -> usize {
        self.state.lock().unwrap().bindings.len()
    }

    #[must_use]
    pub fn attach_count(&self) -> usize {
        self.count(|op| matches!(op, SinkOp::Attach { .. }))
    }

    #[must_use]
    pub fn detach_count(&self) -> usize {
        self.count(|op| matches!(op, SinkOp::Detach { .. }))
    }

    fn count(&self, predicate: impl Fn(&SinkOp) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|op| predicate(op))
            .count()
    }
}

impl SurfaceSink for RecordingSurfaceSink {
    fn attach(&self, surface: &SurfaceId, track: &TrackRef) -> Result<(), BindingError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(SinkOp::Attach {
            surface: surface.clone(),
            track: track.clone(),
        });
        if state.fail_attach.contains(surface) {
            return Err(BindingError::Rejected {
                surface: surface.clone(),
                reason: "scripted attach failure".to_string(),
            });
        }
        state.bindings.insert(surface.clone(), track.clone());
        Ok(())
    }

    fn detach(&self, surface: &SurfaceId, track: &TrackRef) -> Result<(), BindingError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(SinkOp::Detach {
            surface: surface.clone(),
            track: track.clone(),
        });
        if state.fail_detach.contains(surface) {
            return Err(BindingError::SurfaceGone(surface.clone()));
        }
        if state.bindings.get(surface) == Some(track) {
            state.bindings.remove(surface);
        }
        Ok(())
    }
}
