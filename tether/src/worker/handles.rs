//! Registry of live objects handed out by reference.
//!
//! The table lives inside the worker and is only ever touched from the
//! dispatch loop, so there is no locking. It is created with the dispatcher
//! and dropped with the process; releasing an entry early is an explicit
//! client request.

use std::collections::HashMap;

use crate::object::{HostObject, ObjectIter};
use crate::wire::Handle;

/// What a handle denotes.
pub enum HandleEntry {
    /// A live object returned by reference.
    Object(Box<dyn HostObject>),
    /// Iterator state created by `iter_start`.
    Iter {
        /// The iterator itself.
        iter: ObjectIter,
        /// Type label reported when the handle was issued.
        type_name: String,
    },
}

impl HandleEntry {
    /// The entry's type label.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Object(obj) => obj.type_name(),
            Self::Iter { type_name, .. } => type_name,
        }
    }
}

/// Worker-side handle registry.
///
/// Handles are issued monotonically starting at 1 and are never reused,
/// even after release — a stale handle can miss, but it can never alias a
/// newer object.
pub struct HandleTable {
    entries: HashMap<Handle, HandleEntry>,
    next: u64,
}

impl HandleTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next: 1,
        }
    }

    /// Registers an entry and returns its freshly issued handle.
    pub fn register(&mut self, entry: HandleEntry) -> Handle {
        let handle = Handle::from_raw(self.next);
        self.next += 1;
        self.entries.insert(handle, entry);
        handle
    }

    /// Resolves a handle to its entry.
    pub fn resolve(&mut self, handle: Handle) -> Option<&mut HandleEntry> {
        self.entries.get_mut(&handle)
    }

    /// Releases a handle. Unknown or already-released handles are a no-op.
    pub fn release(&mut self, handle: Handle) {
        self.entries.remove(&handle);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
