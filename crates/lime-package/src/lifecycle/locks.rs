//! Multi-key locking over package names

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;

/// Set of package names held by in-flight transitions
///
/// A transaction acquires every name it touches at once, so two
/// transactions with overlapping names serialize while unrelated ones run
/// in parallel. Acquisition is all-or-nothing, which rules out lock-order
/// deadlocks.
#[derive(Debug, Default)]
pub struct NameLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until none of `names` is held, then hold all of them
    pub fn acquire<I, S>(&self, names: I) -> NameGuard<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();

        let mut held = self.held.lock();
        while names.iter().any(|name| held.contains(name)) {
            self.released.wait(&mut held);
        }
        held.extend(names.iter().cloned());
        tracing::trace!(names = ?names, "acquired package locks");

        NameGuard { locks: self, names }
    }

    /// Is `name` currently held?
    pub fn is_held(&self, name: &str) -> bool {
        self.held.lock().contains(name)
    }
}

/// Releases its names on drop
#[derive(Debug)]
pub struct NameGuard<'a> {
    locks: &'a NameLocks,
    names: Vec<String>,
}

impl NameGuard<'_> {
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        for name in &self.names {
            held.remove(name);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
