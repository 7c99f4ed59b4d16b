use crate::runtime::coroutine::{Coroutine, CoroutineId};

use std::collections::HashMap;
use std::rc::Rc;
use std::vec;

/// Identity registry of one scheduling domain.
///
/// The registry owns every live coroutine of the domain and is the only
/// place ids are allocated. It keeps:
/// - the id to coroutine mapping (live count is its size),
/// - the last assigned id,
/// - the high-water mark of the live count,
/// - an enumeration cursor for debugging tools.
pub(crate) struct Registry {
    /// Live coroutines by id.
    coroutines: HashMap<CoroutineId, Rc<Coroutine>>,

    /// Last id handed out; `0` before the first creation.
    last_id: u64,

    /// Highest live count ever observed.
    peak: usize,

    /// Snapshot of ids being enumerated.
    cursor: Option<vec::IntoIter<CoroutineId>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            coroutines: HashMap::new(),
            last_id: 0,
            peak: 0,
            cursor: None,
        }
    }

    /// Allocates the next id.
    pub(crate) fn next_id(&mut self) -> CoroutineId {
        self.last_id += 1;
        CoroutineId::new(self.last_id)
    }

    /// Registers a coroutine and updates the peak count.
    pub(crate) fn insert(&mut self, coroutine: Rc<Coroutine>) {
        self.coroutines.insert(coroutine.id(), coroutine);

        if self.coroutines.len() > self.peak {
            self.peak = self.coroutines.len();
        }
    }

    pub(crate) fn remove(&mut self, id: CoroutineId) -> Option<Rc<Coroutine>> {
        self.coroutines.remove(&id)
    }

    pub(crate) fn get(&self, id: CoroutineId) -> Option<Rc<Coroutine>> {
        self.coroutines.get(&id).cloned()
    }

    pub(crate) fn count(&self) -> usize {
        self.coroutines.len()
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak
    }

    pub(crate) fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Returns the live ids in ascending order.
    pub(crate) fn ids(&self) -> Vec<CoroutineId> {
        let mut ids: Vec<_> = self.coroutines.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Restarts enumeration from the lowest live id.
    pub(crate) fn iter_reset(&mut self) {
        self.cursor = Some(self.ids().into_iter());
    }

    /// Returns the next live coroutine of the enumeration.
    ///
    /// Coroutines that ended after the cursor was reset are skipped.
    pub(crate) fn iter_next(&mut self) -> Option<Rc<Coroutine>> {
        if self.cursor.is_none() {
            self.iter_reset();
        }

        let coroutines = &self.coroutines;
        let cursor = self.cursor.as_mut()?;

        cursor.find_map(|id| coroutines.get(&id).cloned())
    }

    /// Drains every coroutine, for domain teardown.
    pub(crate) fn drain(&mut self) -> Vec<Rc<Coroutine>> {
        self.cursor = None;
        self.coroutines.drain().map(|(_, coroutine)| coroutine).collect()
    }
}
