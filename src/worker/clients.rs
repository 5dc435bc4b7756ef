//! Pages a worker can control.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of an open page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Default)]
struct ClientsInner {
    open: HashSet<ClientId>,
    controlled: HashSet<ClientId>,
    /// Set once the worker has claimed; pages opened afterwards start controlled.
    claimed: bool,
}

/// Registry of open pages and which of them the worker controls.
#[derive(Default)]
pub struct Clients {
    next_id: AtomicU64,
    inner: Mutex<ClientsInner>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened page.
    pub fn open(&self) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut inner) = self.inner.lock() {
            inner.open.insert(id);
            if inner.claimed {
                inner.controlled.insert(id);
            }
        }
        id
    }

    /// Forget a closed page.
    pub fn close(&self, id: ClientId) -> bool {
        match self.inner.lock() {
            Ok(mut inner) => {
                inner.controlled.remove(&id);
                inner.open.remove(&id)
            }
            Err(_) => false,
        }
    }

    /// Take control of every open page without waiting for a reload.
    ///
    /// Returns the number of pages newly brought under control.
    pub fn claim(&self) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        inner.claimed = true;
        let open: Vec<ClientId> = inner.open.iter().copied().collect();
        open.into_iter()
            .filter(|id| inner.controlled.insert(*id))
            .count()
    }

    pub fn is_controlled(&self, id: ClientId) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.controlled.contains(&id))
            .unwrap_or(false)
    }

    /// Number of open pages.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.open.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pages under control.
    pub fn controlled_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.controlled.len())
            .unwrap_or(0)
    }
}
