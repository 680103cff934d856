//! Row-callback registries.
//!
//! Consumers register callbacks to run when rows of a table are inserted,
//! updated, or deleted. Registering returns a [`CallbackId`] which can later
//! be used to deregister just that callback, so a view can scope its
//! subscriptions to its own lifecycle.
//!
//! Callbacks receive only the affected rows, never the client itself, so
//! they cannot re-enter the mutation path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::table::AppliedRow;
use crate::types::{Entity, GameTick, Map, Message, Player, TableRow, User};

/// An identifier for a registered callback.
///
/// Registering a callback returns a `CallbackId`,
/// which can later be used to de-register the callback.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CallbackId {
    id: usize,
}

impl CallbackId {
    /// We maintain a global monotonic counter of [`CallbackId`]s,
    /// even though we only need local uniqueness,
    /// because it's easier than keeping track of a bunch of different counters.
    fn get_next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        CallbackId {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
        }
    }
}

type RowCallback<R> = Box<dyn FnMut(&R) + Send>;
type UpdateCallback<R> = Box<dyn FnMut(&R, &R) + Send>;

/// The insert, update, and delete callbacks registered against one table.
pub struct TableCallbacks<R: TableRow> {
    on_insert: HashMap<CallbackId, RowCallback<R>>,
    on_update: HashMap<CallbackId, UpdateCallback<R>>,
    on_delete: HashMap<CallbackId, RowCallback<R>>,
}

impl<R: TableRow> Default for TableCallbacks<R> {
    fn default() -> Self {
        Self {
            on_insert: HashMap::new(),
            on_update: HashMap::new(),
            on_delete: HashMap::new(),
        }
    }
}

impl<R: TableRow> TableCallbacks<R> {
    pub fn on_insert(&mut self, callback: impl FnMut(&R) + Send + 'static) -> CallbackId {
        let id = CallbackId::get_next();
        self.on_insert.insert(id, Box::new(callback));
        id
    }

    pub fn on_update(&mut self, callback: impl FnMut(&R, &R) + Send + 'static) -> CallbackId {
        let id = CallbackId::get_next();
        self.on_update.insert(id, Box::new(callback));
        id
    }

    pub fn on_delete(&mut self, callback: impl FnMut(&R) + Send + 'static) -> CallbackId {
        let id = CallbackId::get_next();
        self.on_delete.insert(id, Box::new(callback));
        id
    }

    /// Deregistering an unknown id is a no-op; the registration may already
    /// have been dropped with a session.
    pub fn remove_on_insert(&mut self, id: CallbackId) {
        self.on_insert.remove(&id);
    }

    pub fn remove_on_update(&mut self, id: CallbackId) {
        self.on_update.remove(&id);
    }

    pub fn remove_on_delete(&mut self, id: CallbackId) {
        self.on_delete.remove(&id);
    }

    /// Invoke the callbacks matching what a delta actually did to the store.
    pub(crate) fn invoke(&mut self, applied: &AppliedRow<R>) {
        match applied {
            AppliedRow::Inserted(row) => {
                for callback in self.on_insert.values_mut() {
                    callback(row);
                }
            }
            AppliedRow::Updated { old, new } => {
                for callback in self.on_update.values_mut() {
                    callback(old, new);
                }
            }
            AppliedRow::Removed(row) => {
                for callback in self.on_delete.values_mut() {
                    callback(row);
                }
            }
            AppliedRow::Noop => {}
        }
    }
}

/// All row callbacks for the connection, one registry per table.
#[derive(Default)]
pub struct DbCallbacks {
    pub users: TableCallbacks<User>,
    pub players: TableCallbacks<Player>,
    pub messages: TableCallbacks<Message>,
    pub maps: TableCallbacks<Map>,
    pub entities: TableCallbacks<Entity>,
    pub ticks: TableCallbacks<GameTick>,
}
