//! Participant track registry.
//!
//! Pure bookkeeping of which remote participants are in the room and which
//! of their tracks are known, subscribed and bound. It performs no network
//! or rendering work, so the session's event handling can be exercised
//! without a media transport.
//!
//! Tracks are keyed by `(participant, kind)`: lookup and removal are O(1).

use crate::transport::{TrackInfo, TrackKind};

use common::types::{ParticipantIdentity, SurfaceId, TrackSid};
use std::collections::{HashMap, HashSet, VecDeque};

/// Subscription state of a remote track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Published by the participant, not yet subscribed locally.
    Pending,
    /// Media is flowing to the local side.
    Subscribed,
    /// Removed from the registry (only seen on values handed back by removal).
    Unsubscribed,
}

/// Registry key of a track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey {
    pub participant: ParticipantIdentity,
    pub kind: TrackKind,
}

impl TrackKey {
    #[must_use]
    pub fn new(participant: ParticipantIdentity, kind: TrackKind) -> Self {
        Self { participant, kind }
    }
}

/// A concrete track handed to the surface sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    pub participant: ParticipantIdentity,
    pub kind: TrackKind,
    pub sid: TrackSid,
}

impl TrackRef {
    #[must_use]
    pub fn key(&self) -> TrackKey {
        TrackKey::new(self.participant.clone(), self.kind)
    }
}

/// One remote media track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantTrack {
    pub participant_identity: ParticipantIdentity,
    pub sid: TrackSid,
    pub kind: TrackKind,
    pub subscription_state: SubscriptionState,
    pub bound_surface: Option<SurfaceId>,
}

impl ParticipantTrack {
    #[must_use]
    pub fn new(
        participant_identity: ParticipantIdentity,
        track: TrackInfo,
        subscription_state: SubscriptionState,
    ) -> Self {
        Self {
            participant_identity,
            sid: track.sid,
            kind: track.kind,
            subscription_state,
            bound_surface: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> TrackKey {
        TrackKey::new(self.participant_identity.clone(), self.kind)
    }

    #[must_use]
    pub fn track_ref(&self) -> TrackRef {
        TrackRef {
            participant: self.participant_identity.clone(),
            kind: self.kind,
            sid: self.sid.clone(),
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound_surface.is_some()
    }
}

/// A participant and its tracks, ordered audio before video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSummary {
    pub identity: ParticipantIdentity,
    pub tracks: Vec<ParticipantTrack>,
}

/// Immutable view of the roster, ordered by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantsSnapshot {
    pub participants: Vec<ParticipantSummary>,
}

impl ParticipantsSnapshot {
    /// Find a participant in the snapshot.
    #[must_use]
    pub fn participant(&self, identity: &str) -> Option<&ParticipantSummary> {
        self.participants
            .iter()
            .find(|p| p.identity.as_str() == identity)
    }

    /// Find a track in the snapshot.
    #[must_use]
    pub fn track(&self, identity: &str, kind: TrackKind) -> Option<&ParticipantTrack> {
        self.participant(identity)
            .and_then(|p| p.tracks.iter().find(|t| t.kind == kind))
    }

    /// Total number of tracks across all participants.
    #[must_use]
    pub fn track_count(&self) -> usize {
        self.participants.iter().map(|p| p.tracks.len()).sum()
    }
}

/// Mapping from participant identity to that participant's tracks.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: HashMap<ParticipantIdentity, HashMap<TrackKind, ParticipantTrack>>,
}

impl ParticipantRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a participant with no tracks yet. Returns `true` if it was new.
    pub fn join(&mut self, participant: ParticipantIdentity) -> bool {
        if self.participants.contains_key(&participant) {
            return false;
        }
        self.participants.insert(participant, HashMap::new());
        true
    }

    /// Insert a track, replacing any track of the same kind for that
    /// participant. The participant is added if absent.
    pub fn add(&mut self, track: ParticipantTrack) -> Option<ParticipantTrack> {
        self.participants
            .entry(track.participant_identity.clone())
            .or_default()
            .insert(track.kind, track)
    }

    /// Remove one track. The returned value is marked `Unsubscribed`.
    pub fn remove(
        &mut self,
        participant: &ParticipantIdentity,
        kind: TrackKind,
    ) -> Option<ParticipantTrack> {
        let mut removed = self.participants.get_mut(participant)?.remove(&kind)?;
        removed.subscription_state = SubscriptionState::Unsubscribed;
        removed.bound_surface = None;
        Some(removed)
    }

    /// Remove a participant and all its tracks.
    ///
    /// Returns `None` if the participant was unknown, otherwise the removed
    /// tracks (possibly empty), each marked `Unsubscribed`.
    pub fn remove_all(&mut self, participant: &ParticipantIdentity) -> Option<Vec<ParticipantTrack>> {
        let tracks = self.participants.remove(participant)?;
        Some(into_unsubscribed(tracks.into_values()))
    }

    #[must_use]
    pub fn get(&self, participant: &ParticipantIdentity, kind: TrackKind) -> Option<&ParticipantTrack> {
        self.participants.get(participant)?.get(&kind)
    }

    pub fn get_mut(
        &mut self,
        participant: &ParticipantIdentity,
        kind: TrackKind,
    ) -> Option<&mut ParticipantTrack> {
        self.participants.get_mut(participant)?.get_mut(&kind)
    }

    #[must_use]
    pub fn contains_participant(&self, participant: &ParticipantIdentity) -> bool {
        self.participants.contains_key(participant)
    }

    /// Record which surface (if any) a track is bound to.
    /// Returns `false` if the track is unknown.
    pub fn set_bound_surface(&mut self, key: &TrackKey, surface: Option<SurfaceId>) -> bool {
        match self.get_mut(&key.participant, key.kind) {
            Some(track) => {
                track.bound_surface = surface;
                true
            }
            None => false,
        }
    }

    /// The participant's subscribed video track, if it is currently unbound.
    #[must_use]
    pub fn pending_video_for(&self, participant: &ParticipantIdentity) -> Option<&ParticipantTrack> {
        self.get(participant, TrackKind::Video).filter(|t| {
            t.subscription_state == SubscriptionState::Subscribed && !t.is_bound()
        })
    }

    /// Keys of every track currently registered.
    #[must_use]
    pub fn keys(&self) -> Vec<TrackKey> {
        self.participants
            .values()
            .flat_map(|tracks| tracks.values().map(ParticipantTrack::key))
            .collect()
    }

    /// Keys of every track of one participant.
    #[must_use]
    pub fn keys_for(&self, participant: &ParticipantIdentity) -> Vec<TrackKey> {
        self.participants
            .get(participant)
            .map(|tracks| tracks.values().map(ParticipantTrack::key).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn track_count(&self) -> usize {
        self.participants.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Remove everything. Returns the removed tracks marked `Unsubscribed`.
    pub fn clear(&mut self) -> Vec<ParticipantTrack> {
        into_unsubscribed(
            self.participants
                .drain()
                .flat_map(|(_, tracks)| tracks.into_values()),
        )
    }

    /// Ordered snapshot of the roster.
    #[must_use]
    pub fn snapshot(&self) -> ParticipantsSnapshot {
        let mut participants: Vec<ParticipantSummary> = self
            .participants
            .iter()
            .map(|(identity, tracks)| {
                let mut tracks: Vec<ParticipantTrack> = tracks.values().cloned().collect();
                tracks.sort_by_key(|t| t.kind);
                ParticipantSummary {
                    identity: identity.clone(),
                    tracks,
                }
            })
            .collect();
        participants.sort_by(|a, b| a.identity.cmp(&b.identity));

        ParticipantsSnapshot { participants }
    }
}

/// Participants that left the room, so late track events for them can be
/// dropped. Bounded: once full, the oldest departure is forgotten.
#[derive(Debug, Clone)]
pub struct DepartedParticipants {
    capacity: usize,
    order: VecDeque<ParticipantIdentity>,
    members: HashSet<ParticipantIdentity>,
}

impl DepartedParticipants {
    /// `capacity` is clamped to at least 1.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Record a departure. Returns the participant forgotten to make room.
    pub fn insert(&mut self, participant: ParticipantIdentity) -> Option<ParticipantIdentity> {
        if self.members.contains(&participant) {
            return None;
        }
        let evicted = if self.order.len() >= self.capacity {
            let oldest = self.order.pop_front();
            if let Some(oldest) = &oldest {
                self.members.remove(oldest);
            }
            oldest
        } else {
            None
        };
        self.members.insert(participant.clone());
        self.order.push_back(participant);
        evicted
    }

    /// Forget a departure (the participant rejoined).
    pub fn remove(&mut self, participant: &ParticipantIdentity) -> bool {
        if !self.members.remove(participant) {
            return false;
        }
        self.order.retain(|p| p != participant);
        true
    }

    #[must_use]
    pub fn contains(&self, participant: &ParticipantIdentity) -> bool {
        self.members.contains(participant)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

fn into_unsubscribed(tracks: impl Iterator<Item = ParticipantTrack>) -> Vec<ParticipantTrack> {
    tracks
        .map(|mut t| {
            t.subscription_state = SubscriptionState::Unsubscribed;
            t.bound_surface = None;
            t
        })
        .collect()
}
