//! Host listener registry
//!
//! Keeps at most one live host listener per (entity, event kind). Host
//! entities are addressed by index, and an index may name a different object
//! after a structural change, so the registry works in generations: every
//! full subscription pass starts a new generation, entries confirmed during
//! the pass are re-attached to whatever the index names now, and entries the
//! pass never touched are detached.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::host::{ClipRef, EntityRef, EventKind, ListenerId, SessionHost};

/// Work to run when a listener fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    /// Track or return list changed shape
    Structure,
    TrackNames,
    TrackColors,
    ReturnNames,
    ReturnColors,
    Selection,
    SelectedScene,
    Scale,
    FocusedClip,
    Devices,
    /// Clip slot state feeding the grid
    GridSlot,
    /// A slot gained or lost its clip
    SlotContent,
    ClipNotes,
    ClipMarkers,
    /// Playing position of a clip (playhead and playing notes)
    ClipPosition(ClipRef),
    /// Output meter of one mixer strip
    Meter(EntityRef),
}

/// Registry key
pub type SubscriptionKey = (EntityRef, EventKind);

#[derive(Debug, Clone, Copy)]
struct Subscription {
    listener: ListenerId,
    handler: Handler,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<SubscriptionKey, Subscription>,
    by_listener: HashMap<ListenerId, SubscriptionKey>,
    generation: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a full subscription pass
    pub fn begin_pass(&mut self) -> u64 {
        self.generation += 1;
        trace!("Subscription pass {} started", self.generation);
        self.generation
    }

    /// Attach a listener unless the key is already live in this generation.
    ///
    /// Entries left over from an earlier generation are detached (best
    /// effort) and attached again. Returns `false` when the host refused the
    /// entity, which is expected for entities that just disappeared.
    pub fn ensure_subscribed(
        &mut self,
        host: &mut dyn SessionHost,
        entity: EntityRef,
        kind: EventKind,
        handler: Handler,
    ) -> bool {
        let key = (entity, kind);

        if let Some(existing) = self.entries.get_mut(&key) {
            if existing.generation == self.generation {
                existing.handler = handler;
                return true;
            }

            let stale = existing.listener;
            self.entries.remove(&key);
            self.by_listener.remove(&stale);
            if let Err(e) = host.remove_listener(stale) {
                trace!("Stale listener {:?} not removed: {}", stale, e);
            }
        }

        match host.add_listener(entity, kind) {
            Ok(listener) => {
                self.entries.insert(
                    key,
                    Subscription {
                        listener,
                        handler,
                        generation: self.generation,
                    },
                );
                self.by_listener.insert(listener, key);
                true
            }
            Err(e) => {
                debug!("Skipping listener {:?}/{:?}: {}", entity, kind, e);
                false
            }
        }
    }

    /// Detach entries the current pass did not confirm. Most belong to
    /// entities that are gone, in which case the host has already released
    /// them and the removal is a no-op.
    pub fn finish_pass(&mut self, host: &mut dyn SessionHost) -> usize {
        let generation = self.generation;
        let dropped = self.unsubscribe_where(host, |_, sub| sub.generation != generation);
        if dropped > 0 {
            debug!("Subscription pass {} dropped {} entries", generation, dropped);
        }
        dropped
    }

    /// Detach every listener attached to `entity`
    pub fn unsubscribe_all(&mut self, host: &mut dyn SessionHost, entity: EntityRef) -> usize {
        self.unsubscribe_matching(host, |(e, _)| *e == entity)
    }

    /// Detach every listener whose key matches
    pub fn unsubscribe_matching(
        &mut self,
        host: &mut dyn SessionHost,
        matches: impl Fn(&SubscriptionKey) -> bool,
    ) -> usize {
        self.unsubscribe_where(host, |key, _| matches(key))
    }

    /// Detach everything (teardown)
    pub fn unsubscribe_everything(&mut self, host: &mut dyn SessionHost) -> usize {
        let detached = self.unsubscribe_where(host, |_, _| true);
        debug!("Detached {} listeners", detached);
        detached
    }

    /// Resolve a fired listener to the entity it watches and its handler
    pub fn handler_for(&self, listener: ListenerId) -> Option<(EntityRef, Handler)> {
        let key = self.by_listener.get(&listener)?;
        self.entries.get(key).map(|sub| (key.0, sub.handler))
    }

    pub fn is_subscribed(&self, entity: EntityRef, kind: EventKind) -> bool {
        self.entries.contains_key(&(entity, kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unsubscribe_where(
        &mut self,
        host: &mut dyn SessionHost,
        matches: impl Fn(&SubscriptionKey, &Subscription) -> bool,
    ) -> usize {
        let keys: Vec<SubscriptionKey> = self
            .entries
            .iter()
            .filter(|(key, sub)| matches(key, sub))
            .map(|(key, _)| *key)
            .collect();

        for key in &keys {
            self.detach(host, key);
        }
        keys.len()
    }

    fn detach(&mut self, host: &mut dyn SessionHost, key: &SubscriptionKey) {
        if let Some(sub) = self.entries.remove(key) {
            self.by_listener.remove(&sub.listener);
            if let Err(e) = host.remove_listener(sub.listener) {
                trace!("Listener {:?} already gone: {}", sub.listener, e);
            }
        }
    }
}
