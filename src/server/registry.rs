//! Arena of live sessions addressed by stable handles.

use crate::server::session::Session;

/// Stable handle of a session.
///
/// The generation distinguishes a reused slot from the session that held it
/// before, so a stale handle never reaches a newer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    index: usize,
    generation: u32,
}

impl SessionId {
    pub fn from_index(index: usize) -> Self {
        Self {
            index,
            generation: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    session: Option<Session>,
}

/// The set of live sessions, iterated by the poll engine in slot order
#[derive(Default)]
pub struct SessionRegistry {
    slots: Vec<Slot>,
    live: usize,
    max: usize,
}

impl SessionRegistry {
    pub fn new(max: usize) -> Self {
        Self {
            slots: Vec::with_capacity(max),
            live: 0,
            max,
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn is_full(&self) -> bool {
        self.live >= self.max
    }

    /// Create a session in a free slot; `None` when the registry is full.
    pub fn insert(&mut self, make: impl FnOnce(SessionId) -> Session) -> Option<SessionId> {
        if self.is_full() {
            return None;
        }
        let index = match self.slots.iter().position(|s| s.session.is_none()) {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        let id = SessionId {
            index,
            generation: slot.generation,
        };
        slot.session = Some(make(id));
        self.live += 1;
        Some(id)
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        let session = slot.session.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.live -= 1;
        Some(session)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.session.as_ref())
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.session.as_mut())
    }

    /// Handles of live sessions in registry order.
    pub fn ids(&self) -> Vec<SessionId> {
        self.iter().map(Session::id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().filter_map(|s| s.session.as_ref())
    }
}
