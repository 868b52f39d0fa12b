//! Runner directory
//!
//! The directory maps a logical runner name to a live handle. Runners
//! resolve their target at every hand-off instead of caching the handle,
//! because a runner's current location changes each time it moves.

use std::collections::HashMap;

use parking_lot::RwLock;

use relay_core::{Location, RelayError, RelayResult, Role, RunnerId};

use crate::Postbox;

/// Addressable handle of a registered runner
#[derive(Clone, Debug)]
pub struct Handle {
    pub id: RunnerId,
    pub role: Role,
    /// Exchange zone where this runner takes over the baton
    pub post: Location,
    /// Where the runner currently resides
    pub location: Location,
    pub postbox: Postbox,
}

impl Handle {
    pub fn new(id: RunnerId, role: Role, post: Location, postbox: Postbox) -> Self {
        Handle {
            id,
            role,
            location: post.clone(),
            post,
            postbox,
        }
    }
}

/// Name resolution
pub trait Directory: Send + Sync {
    /// Resolve a logical name to its current handle
    fn resolve(&self, id: &RunnerId) -> RelayResult<Handle>;
}

/// A directory that runners can register into and update
pub trait Registry: Directory {
    fn register(&self, handle: Handle) -> RelayResult<()>;

    /// Remove a runner; returns its last handle if it was registered
    fn deregister(&self, id: &RunnerId) -> Option<Handle>;

    /// Record a runner's new location after it moved
    fn update_location(&self, id: &RunnerId, location: Location) -> RelayResult<()>;

    /// Registered runners of a role, sorted by name
    fn search(&self, role: Role) -> Vec<RunnerId>;
}

/// In-process directory backed by a hash map
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<RunnerId, Handle>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered runners
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Directory for InMemoryDirectory {
    fn resolve(&self, id: &RunnerId) -> RelayResult<Handle> {
        self.entries
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::NotFound(id.clone()))
    }
}

impl Registry for InMemoryDirectory {
    fn register(&self, handle: Handle) -> RelayResult<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&handle.id) {
            return Err(RelayError::AlreadyRegistered(handle.id));
        }
        tracing::debug!(runner = %handle.id, role = %handle.role, post = %handle.post, "registered");
        entries.insert(handle.id.clone(), handle);
        Ok(())
    }

    fn deregister(&self, id: &RunnerId) -> Option<Handle> {
        let removed = self.entries.write().remove(id);
        if removed.is_some() {
            tracing::debug!(runner = %id, "deregistered");
        }
        removed
    }

    fn update_location(&self, id: &RunnerId, location: Location) -> RelayResult<()> {
        let mut entries = self.entries.write();
        let handle = entries
            .get_mut(id)
            .ok_or_else(|| RelayError::NotFound(id.clone()))?;
        handle.location = location;
        Ok(())
    }

    fn search(&self, role: Role) -> Vec<RunnerId> {
        let mut found: Vec<RunnerId> = self
            .entries
            .read()
            .values()
            .filter(|h| h.role == role)
            .map(|h| h.id.clone())
            .collect();
        found.sort();
        found
    }
}
