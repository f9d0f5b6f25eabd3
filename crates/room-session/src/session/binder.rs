//! Media surface binder.
//!
//! Keeps the two-way mapping between remote tracks and host render surfaces
//! and delegates the actual attach/detach to the host's [`SurfaceSink`].
//!
//! # Invariants
//!
//! - A track is bound to at most one surface.
//! - A surface shows at most one track; binding a second track displaces the
//!   first, which is reported back so the caller can mark it unbound.
//! - The binder's bookkeeping is updated even when the sink fails, so a
//!   broken surface never leaves a stale binding behind.

use crate::config::{DEFAULT_LOCAL_SURFACE, DEFAULT_REMOTE_SURFACE};
use crate::errors::BindingError;
use crate::observability::metrics;
use crate::session::registry::{TrackKey, TrackRef};

use common::types::{ParticipantIdentity, SurfaceId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Host render surface contract.
///
/// Implementations must be cheap and non-blocking: they are called from the
/// session actor's loop.
pub trait SurfaceSink: Send + Sync {
    /// Start rendering `track` on `surface`.
    ///
    /// # Errors
    ///
    /// Returns `BindingError` if the surface is gone or refuses the track.
    fn attach(&self, surface: &SurfaceId, track: &TrackRef) -> Result<(), BindingError>;

    /// Stop rendering `track` on `surface`.
    ///
    /// # Errors
    ///
    /// Returns `BindingError` if the surface is gone or refuses the request.
    fn detach(&self, surface: &SurfaceId, track: &TrackRef) -> Result<(), BindingError>;
}

/// Which surface each track should land on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceLayout {
    local: SurfaceId,
    default_remote: Option<SurfaceId>,
    /// `None` marks a participant whose surface was released by the host.
    overrides: HashMap<ParticipantIdentity, Option<SurfaceId>>,
}

impl SurfaceLayout {
    #[must_use]
    pub fn new(local: SurfaceId, default_remote: Option<SurfaceId>) -> Self {
        Self {
            local,
            default_remote,
            overrides: HashMap::new(),
        }
    }

    /// Builder-style per-participant assignment.
    ///
    /// # Errors
    ///
    /// Returns `BindingError::ReservedSurface` if `surface` is the local surface.
    pub fn with_remote_for(
        mut self,
        participant: ParticipantIdentity,
        surface: SurfaceId,
    ) -> Result<Self, BindingError> {
        self.assign(participant, surface)?;
        Ok(self)
    }

    /// Surface for the local participant's camera.
    #[must_use]
    pub fn local(&self) -> &SurfaceId {
        &self.local
    }

    /// Surface shared by remote participants without an assignment.
    #[must_use]
    pub fn default_remote(&self) -> Option<&SurfaceId> {
        self.default_remote.as_ref()
    }

    /// Designated surface for a remote participant: its assignment if any,
    /// otherwise the default remote surface.
    #[must_use]
    pub fn remote_surface_for(&self, participant: &ParticipantIdentity) -> Option<&SurfaceId> {
        match self.overrides.get(participant) {
            Some(assigned) => assigned.as_ref(),
            None => self.default_remote.as_ref(),
        }
    }

    /// Give `participant` its own surface. Returns the previous assignment.
    ///
    /// # Errors
    ///
    /// Returns `BindingError::ReservedSurface` if `surface` is the local
    /// surface. The layout is left unchanged.
    pub fn assign(
        &mut self,
        participant: ParticipantIdentity,
        surface: SurfaceId,
    ) -> Result<Option<SurfaceId>, BindingError> {
        if surface == self.local {
            return Err(BindingError::ReservedSurface(surface));
        }
        Ok(self.overrides.insert(participant, Some(surface)).flatten())
    }

    /// Remove the participant's surface. The participant is not moved back to
    /// the default surface; it has no designated surface until reassigned.
    pub fn release(&mut self, participant: ParticipantIdentity) -> Option<SurfaceId> {
        self.overrides.insert(participant, None).flatten()
    }
}

impl Default for SurfaceLayout {
    fn default() -> Self {
        Self::new(
            SurfaceId::from(DEFAULT_LOCAL_SURFACE),
            Some(SurfaceId::from(DEFAULT_REMOTE_SURFACE)),
        )
    }
}

/// Track to surface bindings.
pub struct MediaSurfaceBinder {
    sink: Arc<dyn SurfaceSink>,
    by_surface: HashMap<SurfaceId, TrackRef>,
    by_track: HashMap<TrackKey, SurfaceId>,
}

impl fmt::Debug for MediaSurfaceBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSurfaceBinder")
            .field("bindings", &self.by_surface)
            .finish_non_exhaustive()
    }
}

impl MediaSurfaceBinder {
    #[must_use]
    pub fn new(sink: Arc<dyn SurfaceSink>) -> Self {
        Self {
            sink,
            by_surface: HashMap::new(),
            by_track: HashMap::new(),
        }
    }

    /// Bind `track` to `surface`.
    ///
    /// Releases the track from any other surface first, then detaches whatever
    /// the surface currently shows. Returns the displaced track, if any.
    /// Binding a track to the surface it already occupies is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the sink's `BindingError` if attaching fails; the track is then
    /// left unbound.
    pub fn bind(
        &mut self,
        track: &TrackRef,
        surface: &SurfaceId,
    ) -> Result<Option<TrackRef>, BindingError> {
        if self.by_surface.get(surface) == Some(track) {
            return Ok(None);
        }

        let key = track.key();
        if self.by_track.contains_key(&key) {
            if let Err(e) = self.unbind(&key) {
                warn!(
                    target: "room.session.binder",
                    participant = %key.participant,
                    kind = %key.kind,
                    error = %e,
                    "Failed to release previous surface, continuing"
                );
            }
        }

        let displaced = self.by_surface.remove(surface);
        if let Some(occupant) = &displaced {
            self.by_track.remove(&occupant.key());
            if let Err(e) = self.sink.detach(surface, occupant) {
                metrics::record_bind_failure("detach");
                warn!(
                    target: "room.session.binder",
                    surface = %surface,
                    participant = %occupant.participant,
                    error = %e,
                    "Failed to detach displaced track"
                );
            }
            debug!(
                target: "room.session.binder",
                surface = %surface,
                displaced = %occupant.participant,
                participant = %track.participant,
                "Surface displaced"
            );
        }

        let attached = self.sink.attach(surface, track);
        if let Err(e) = attached {
            metrics::record_bind_failure("attach");
            self.publish_count();
            return Err(e);
        }

        self.by_surface.insert(surface.clone(), track.clone());
        self.by_track.insert(key, surface.clone());
        self.publish_count();

        debug!(
            target: "room.session.binder",
            surface = %surface,
            participant = %track.participant,
            kind = %track.kind,
            track_sid = %track.sid,
            "Track bound"
        );

        Ok(displaced)
    }

    /// Unbind a track. Returns the surface it was on, `None` if unbound.
    ///
    /// # Errors
    ///
    /// Returns the sink's `BindingError` if detaching fails. The binding is
    /// forgotten either way.
    pub fn unbind(&mut self, key: &TrackKey) -> Result<Option<SurfaceId>, BindingError> {
        let Some(surface) = self.by_track.remove(key) else {
            return Ok(None);
        };
        let Some(track) = self.by_surface.remove(&surface) else {
            self.publish_count();
            return Ok(Some(surface));
        };
        self.publish_count();

        self.sink.detach(&surface, &track).map_err(|e| {
            metrics::record_bind_failure("detach");
            e
        })?;

        debug!(
            target: "room.session.binder",
            surface = %surface,
            participant = %key.participant,
            kind = %key.kind,
            "Track unbound"
        );

        Ok(Some(surface))
    }

    /// Unbind whatever `surface` shows. Returns that track, `None` if empty.
    ///
    /// # Errors
    ///
    /// Returns the sink's `BindingError` if detaching fails.
    pub fn unbind_surface(&mut self, surface: &SurfaceId) -> Result<Option<TrackRef>, BindingError> {
        let Some(track) = self.by_surface.get(surface).cloned() else {
            return Ok(None);
        };
        self.unbind(&track.key())?;
        Ok(Some(track))
    }

    /// Release every binding.
    ///
    /// Returns how many surfaces were released and the failures met along
    /// the way. Never stops early.
    pub fn unbind_all(&mut self) -> (usize, Vec<BindingError>) {
        let mut bindings: Vec<(SurfaceId, TrackRef)> = self.by_surface.drain().collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        self.by_track.clear();
        self.publish_count();

        let released = bindings.len();
        let mut failures = Vec::new();
        for (surface, track) in bindings {
            if let Err(e) = self.sink.detach(&surface, &track) {
                metrics::record_bind_failure("detach");
                warn!(
                    target: "room.session.binder",
                    surface = %surface,
                    participant = %track.participant,
                    error = %e,
                    "Failed to detach during release"
                );
                failures.push(e);
            }
        }

        (released, failures)
    }

    /// Surface a track is bound to.
    #[must_use]
    pub fn surface_of(&self, key: &TrackKey) -> Option<&SurfaceId> {
        self.by_track.get(key)
    }

    /// Track shown on a surface.
    #[must_use]
    pub fn track_on(&self, surface: &SurfaceId) -> Option<&TrackRef> {
        self.by_surface.get(surface)
    }

    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.by_surface.len()
    }

    fn publish_count(&self) {
        metrics::set_bound_surfaces(self.by_surface.len());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::transport::TrackKind;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestSink {
        ops: Mutex<Vec<String>>,
        broken: Mutex<HashSet<SurfaceId>>,
    }

    impl TestSink {
        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }

        fn break_surface(&self, surface: &str) {
            self.broken.lock().unwrap().insert(SurfaceId::from(surface));
        }

        fn check(&self, surface: &SurfaceId) -> Result<(), BindingError> {
            if self.broken.lock().unwrap().contains(surface) {
                return Err(BindingError::SurfaceGone(surface.clone()));
            }
            Ok(())
        }
    }

    impl SurfaceSink for TestSink {
        fn attach(&self, surface: &SurfaceId, track: &TrackRef) -> Result<(), BindingError> {
            self.ops
                .lock()
                .unwrap()
                .push(format!("attach {surface} {}", track.participant));
            self.check(surface)
        }

        fn detach(&self, surface: &SurfaceId, track: &TrackRef) -> Result<(), BindingError> {
            self.ops
                .lock()
                .unwrap()
                .push(format!("detach {surface} {}", track.participant));
            self.check(surface)
        }
    }

    fn video(participant: &str) -> TrackRef {
        TrackRef {
            participant: ParticipantIdentity::from(participant),
            kind: TrackKind::Video,
            sid: format!("TR_{participant}").into(),
        }
    }

    fn surface(name: &str) -> SurfaceId {
        SurfaceId::from(name)
    }

    fn binder() -> (Arc<TestSink>, MediaSurfaceBinder) {
        let sink = Arc::new(TestSink::default());
        let binder = MediaSurfaceBinder::new(sink.clone());
        (sink, binder)
    }

    #[test]
    fn test_bind_attaches_and_records() {
        let (sink, mut binder) = binder();
        let bob = video("bob");

        let displaced = binder.bind(&bob, &surface("remote-video")).unwrap();

        assert!(displaced.is_none());
        assert_eq!(binder.surface_of(&bob.key()), Some(&surface("remote-video")));
        assert_eq!(binder.track_on(&surface("remote-video")), Some(&bob));
        assert_eq!(sink.ops(), vec!["attach remote-video bob"]);
    }

    #[test]
    fn test_bind_same_surface_twice_is_noop() {
        let (sink, mut binder) = binder();
        let bob = video("bob");

        binder.bind(&bob, &surface("remote-video")).unwrap();
        binder.bind(&bob, &surface("remote-video")).unwrap();

        assert_eq!(sink.ops().len(), 1);
        assert_eq!(binder.bound_count(), 1);
    }

    #[test]
    fn test_second_track_displaces_first() {
        let (sink, mut binder) = binder();
        let bob = video("bob");
        let carol = video("carol");

        binder.bind(&bob, &surface("remote-video")).unwrap();
        let displaced = binder.bind(&carol, &surface("remote-video")).unwrap();

        assert_eq!(displaced, Some(bob.clone()));
        assert!(binder.surface_of(&bob.key()).is_none());
        assert_eq!(binder.track_on(&surface("remote-video")), Some(&carol));
        assert_eq!(
            sink.ops(),
            vec![
                "attach remote-video bob",
                "detach remote-video bob",
                "attach remote-video carol"
            ]
        );
    }

    #[test]
    fn test_rebinding_track_releases_previous_surface() {
        let (sink, mut binder) = binder();
        let bob = video("bob");

        binder.bind(&bob, &surface("remote-video")).unwrap();
        binder.bind(&bob, &surface("tile-1")).unwrap();

        assert_eq!(binder.bound_count(), 1);
        assert!(binder.track_on(&surface("remote-video")).is_none());
        assert_eq!(binder.surface_of(&bob.key()), Some(&surface("tile-1")));
        assert_eq!(
            sink.ops(),
            vec![
                "attach remote-video bob",
                "detach remote-video bob",
                "attach tile-1 bob"
            ]
        );
    }

    #[test]
    fn test_unbind_is_idempotent() {
        let (sink, mut binder) = binder();
        let bob = video("bob");
        binder.bind(&bob, &surface("remote-video")).unwrap();

        assert_eq!(binder.unbind(&bob.key()).unwrap(), Some(surface("remote-video")));
        assert_eq!(binder.unbind(&bob.key()).unwrap(), None);
        assert_eq!(binder.bound_count(), 0);
        assert_eq!(sink.ops().len(), 2);
    }

    #[test]
    fn test_attach_failure_leaves_track_unbound() {
        let (sink, mut binder) = binder();
        sink.break_surface("remote-video");

        let result = binder.bind(&video("bob"), &surface("remote-video"));

        assert_eq!(
            result,
            Err(BindingError::SurfaceGone(surface("remote-video")))
        );
        assert_eq!(binder.bound_count(), 0);
    }

    #[test]
    fn test_detach_failure_still_forgets_binding() {
        let (sink, mut binder) = binder();
        let bob = video("bob");
        binder.bind(&bob, &surface("remote-video")).unwrap();
        sink.break_surface("remote-video");

        assert!(binder.unbind(&bob.key()).is_err());
        assert!(binder.surface_of(&bob.key()).is_none());
        assert_eq!(binder.bound_count(), 0);
    }

    #[test]
    fn test_unbind_all_collects_failures() {
        let (sink, mut binder) = binder();
        binder.bind(&video("bob"), &surface("tile-1")).unwrap();
        binder.bind(&video("carol"), &surface("tile-2")).unwrap();
        binder.bind(&video("dave"), &surface("tile-3")).unwrap();
        sink.break_surface("tile-2");

        let (released, failures) = binder.unbind_all();

        assert_eq!(released, 3);
        assert_eq!(failures, vec![BindingError::SurfaceGone(surface("tile-2"))]);
        assert_eq!(binder.bound_count(), 0);

        let (released, failures) = binder.unbind_all();
        assert_eq!(released, 0);
        assert!(failures.is_empty());
    }

    #[test]
    fn test_unbind_surface() {
        let (_sink, mut binder) = binder();
        let bob = video("bob");
        binder.bind(&bob, &surface("tile-1")).unwrap();

        assert_eq!(binder.unbind_surface(&surface("tile-1")).unwrap(), Some(bob));
        assert_eq!(binder.unbind_surface(&surface("tile-1")).unwrap(), None);
    }

    #[test]
    fn test_layout_resolution() {
        let bob = ParticipantIdentity::from("bob");
        let carol = ParticipantIdentity::from("carol");
        let mut layout = SurfaceLayout::new(surface("local-video"), Some(surface("remote-video")))
            .with_remote_for(bob.clone(), surface("tile-bob"))
            .unwrap();

        assert_eq!(layout.local(), &surface("local-video"));
        assert_eq!(layout.remote_surface_for(&bob), Some(&surface("tile-bob")));
        assert_eq!(layout.remote_surface_for(&carol), Some(&surface("remote-video")));

        assert_eq!(layout.release(bob.clone()), Some(surface("tile-bob")));
        assert_eq!(layout.remote_surface_for(&bob), None);

        assert_eq!(layout.assign(bob.clone(), surface("tile-2")).unwrap(), None);
        assert_eq!(layout.remote_surface_for(&bob), Some(&surface("tile-2")));
    }

    #[test]
    fn test_layout_refuses_local_surface_for_remote() {
        let bob = ParticipantIdentity::from("bob");
        let mut layout = SurfaceLayout::new(surface("local-video"), Some(surface("remote-video")));

        assert_eq!(
            layout.assign(bob.clone(), surface("local-video")),
            Err(BindingError::ReservedSurface(surface("local-video")))
        );
        assert_eq!(layout.remote_surface_for(&bob), Some(&surface("remote-video")));

        let built = SurfaceLayout::default().with_remote_for(bob, surface("local-video"));
        assert!(matches!(built, Err(BindingError::ReservedSurface(_))));
    }

    #[test]
    fn test_layout_without_default_remote() {
        let layout = SurfaceLayout::new(surface("local-video"), None);
        assert!(layout
            .remote_surface_for(&ParticipantIdentity::from("bob"))
            .is_none());
    }
}
