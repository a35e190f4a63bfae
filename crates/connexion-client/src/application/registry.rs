//! In-memory registry of live client sessions.
//!
//! The registry is the single source of truth shared by the session manager
//! (which inserts and removes entries) and the dispatch router (which looks
//! up the target of every incoming record).  Each entry tracks:
//!
//! - The application signature it was registered for.
//! - The current [`Subscription`] (capability mask plus button mask).
//! - A generation number unique to this registration.
//!
//! # Why generations? (for beginners)
//!
//! The driver reuses client ids: after client 3 unregisters, the next
//! registration may get id 3 again.  A stale `ClientSession` value still
//! holding id 3 must not be able to act on the new registration, so every
//! insert gets a fresh generation and operations check both numbers.

use std::collections::HashMap;

use connexion_core::protocol::messages::{ButtonMask, CapabilityMask, Signature};
use connexion_core::Subscription;

/// Registry state for one live client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredClient {
    pub generation: u64,
    pub signature: Signature,
    pub subscription: Subscription,
}

/// Live clients keyed by driver-assigned id.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<u16, RegisteredClient>,
    next_generation: u64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new registration and returns its generation.
    ///
    /// Returns `None` if `signature` already holds a live entry.  An entry
    /// left under the same id is replaced.
    pub fn insert(&mut self, id: u16, signature: Signature, subscription: Subscription) -> Option<u64> {
        if self.contains_signature(signature) {
            return None;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.clients.insert(
            id,
            RegisteredClient {
                generation,
                signature,
                subscription,
            },
        );
        Some(generation)
    }

    pub fn get(&self, id: u16) -> Option<&RegisteredClient> {
        self.clients.get(&id)
    }

    /// Returns the entry only if it is still the given registration.
    pub fn get_live(&self, id: u16, generation: u64) -> Option<&RegisteredClient> {
        self.clients.get(&id).filter(|c| c.generation == generation)
    }

    pub fn is_live(&self, id: u16, generation: u64) -> bool {
        self.get_live(id, generation).is_some()
    }

    pub fn contains_signature(&self, signature: Signature) -> bool {
        self.clients.values().any(|c| c.signature == signature)
    }

    /// Replaces the capability mask of a live entry; `false` if stale.
    pub fn set_capability(&mut self, id: u16, generation: u64, mask: CapabilityMask) -> bool {
        match self.clients.get_mut(&id).filter(|c| c.generation == generation) {
            Some(client) => {
                client.subscription.capability = mask;
                true
            }
            None => false,
        }
    }

    /// Replaces the button mask of a live entry; `false` if stale.
    pub fn set_buttons(&mut self, id: u16, generation: u64, mask: ButtonMask) -> bool {
        match self.clients.get_mut(&id).filter(|c| c.generation == generation) {
            Some(client) => {
                client.subscription.buttons = mask;
                true
            }
            None => false,
        }
    }

    /// Removes the entry if it is still the given registration.
    pub fn remove(&mut self, id: u16, generation: u64) -> Option<RegisteredClient> {
        if self.is_live(id, generation) {
            self.clients.remove(&id)
        } else {
            None
        }
    }

    /// Removes every entry, returning ids and entries.
    pub fn drain(&mut self) -> Vec<(u16, RegisteredClient)> {
        self.clients.drain().collect()
    }

    pub fn ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
