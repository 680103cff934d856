//! The per-table row store and the delta applier that mutates it.
//!
//! Each [`TableCache`] is a local mirror of the subscribed rows of one table.
//! It is mutated exclusively by [`TableCache::apply`]; every other component
//! only reads. Deltas are applied strictly in the order the transport
//! delivers them, and redelivery is tolerated: an insert for a resident key
//! overwrites silently, a delete for an absent key is a no-op.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::types::TableRow;

/// A single insert, update, or delete notification for one row.
#[derive(Clone, Debug, PartialEq)]
pub enum RowDelta<R> {
    Insert(R),
    /// `old` is the value the server claims was replaced. It is expected to
    /// match the resident row; a mismatch is tolerated but counted as drift.
    Update { old: R, new: R },
    Delete(R),
}

/// What actually happened to the store when a delta was applied.
#[derive(Clone, Debug, PartialEq)]
pub enum AppliedRow<R> {
    Inserted(R),
    Updated { old: R, new: R },
    Removed(R),
    /// A delete for a key that was not resident.
    Noop,
}

struct Slot<R> {
    /// Monotonic arrival order, assigned when the key first entered the
    /// store and kept across redelivered inserts so that derived views sort
    /// stably.
    seq: u64,
    row: R,
}

/// A local mirror of one replicated table, keyed by the row's declared key.
pub struct TableCache<R: TableRow> {
    entries: HashMap<R::Key, Slot<R>>,
    next_seq: u64,
    anomalies: u64,
}

// Can't derive this because the `R` generic messes us up.
impl<R: TableRow> Default for TableCache<R> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
            anomalies: 0,
        }
    }
}

impl<R: TableRow> TableCache<R> {
    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.entries.get(key).map(|slot| &slot.row)
    }

    /// Iteration order is not meaningful; consumers that need an order sort
    /// explicitly.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.entries.values().map(|slot| &slot.row)
    }

    /// Rows paired with their arrival sequence, for views that break ties by
    /// insertion order.
    pub fn iter_with_arrival(&self) -> impl Iterator<Item = (u64, &R)> {
        self.entries.values().map(|slot| (slot.seq, &slot.row))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count of update deltas whose declared old value did not match the
    /// resident row. Nonzero means the mirror drifted from the server at
    /// some point; the new values were applied regardless.
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
        self.anomalies = 0;
    }

    /// Apply one delta, returning what actually changed.
    pub(crate) fn apply(&mut self, delta: RowDelta<R>) -> AppliedRow<R> {
        match delta {
            RowDelta::Insert(row) => {
                self.put(row.key(), row.clone());
                AppliedRow::Inserted(row)
            }

            RowDelta::Update { old, new } => {
                let old_key = old.key();
                let new_key = new.key();
                // A key change on update is not expected from this server,
                // but must not strand the old row if it ever happens.
                if old_key != new_key {
                    log::warn!(
                        "update in `{}` changed key {:?} -> {:?}",
                        R::TABLE,
                        old_key,
                        new_key
                    );
                    self.entries.remove(&old_key);
                }
                match self.entries.entry(new_key) {
                    Entry::Occupied(mut occupied) => {
                        if occupied.get().row != old {
                            self.anomalies += 1;
                            log::warn!(
                                "stale update in `{}`: declared old value does not match resident row {:?}",
                                R::TABLE,
                                old.key()
                            );
                        }
                        // The server is authoritative: apply the new value
                        // even when the old one disagrees.
                        occupied.get_mut().row = new.clone();
                    }
                    Entry::Vacant(vacant) => {
                        self.anomalies += 1;
                        log::warn!(
                            "update in `{}` targeted absent key {:?}",
                            R::TABLE,
                            old.key()
                        );
                        vacant.insert(Slot {
                            seq: self.next_seq,
                            row: new.clone(),
                        });
                        self.next_seq += 1;
                    }
                }
                AppliedRow::Updated { old, new }
            }

            RowDelta::Delete(row) => match self.entries.remove(&row.key()) {
                Some(slot) => AppliedRow::Removed(slot.row),
                None => {
                    log::trace!("delete of absent key {:?} in `{}`", row.key(), R::TABLE);
                    AppliedRow::Noop
                }
            },
        }
    }

    fn put(&mut self, key: R::Key, row: R) {
        match self.entries.entry(key) {
            // Redelivered insert, e.g. on resubscription: overwrite silently
            // and keep the original arrival sequence.
            Entry::Occupied(mut occupied) => {
                log::trace!("redelivered insert in `{}`", R::TABLE);
                occupied.get_mut().row = row;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    seq: self.next_seq,
                    row,
                });
                self.next_seq += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::types::{Message, Timestamp};

    fn message(id: u64, text: &str) -> Message {
        Message {
            id,
            sender: Identity::from_bytes([1; 32]),
            sent: Timestamp::from_micros(id as i64),
            text: text.into(),
        }
    }

    fn keys(cache: &TableCache<Message>) -> Vec<u64> {
        let mut keys: Vec<u64> = cache.iter().map(|m| m.id).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn replay_converges_to_last_writer() {
        let mut cache = TableCache::<Message>::default();
        cache.apply(RowDelta::Insert(message(1, "a")));
        cache.apply(RowDelta::Insert(message(2, "b")));
        cache.apply(RowDelta::Update {
            old: message(1, "a"),
            new: message(1, "a2"),
        });
        cache.apply(RowDelta::Delete(message(2, "b")));
        cache.apply(RowDelta::Insert(message(3, "c")));

        assert_eq!(keys(&cache), vec![1, 3]);
        assert_eq!(cache.get(&1).unwrap().text, "a2");
        assert_eq!(cache.anomalies(), 0);
    }

    #[test]
    fn redelivered_insert_is_idempotent() {
        let mut cache = TableCache::<Message>::default();
        assert_eq!(
            cache.apply(RowDelta::Insert(message(7, "hi"))),
            AppliedRow::Inserted(message(7, "hi"))
        );
        let seq_before: Vec<_> = cache.iter_with_arrival().map(|(seq, _)| seq).collect();
        cache.apply(RowDelta::Insert(message(7, "hi")));

        assert_eq!(cache.len(), 1);
        let seq_after: Vec<_> = cache.iter_with_arrival().map(|(seq, _)| seq).collect();
        assert_eq!(seq_before, seq_after);
        assert_eq!(cache.anomalies(), 0);
    }

    #[test]
    fn delete_of_absent_key_is_a_noop() {
        let mut cache = TableCache::<Message>::default();
        cache.apply(RowDelta::Insert(message(1, "a")));
        assert_eq!(cache.apply(RowDelta::Delete(message(9, "x"))), AppliedRow::Noop);
        assert_eq!(keys(&cache), vec![1]);
    }

    #[test]
    fn mismatched_old_value_is_counted_but_applied() {
        let mut cache = TableCache::<Message>::default();
        cache.apply(RowDelta::Insert(message(1, "resident")));
        cache.apply(RowDelta::Update {
            old: message(1, "something else"),
            new: message(1, "new"),
        });

        assert_eq!(cache.get(&1).unwrap().text, "new");
        assert_eq!(cache.anomalies(), 1);
    }

    #[test]
    fn update_of_absent_key_inserts_and_counts() {
        let mut cache = TableCache::<Message>::default();
        cache.apply(RowDelta::Update {
            old: message(5, "ghost"),
            new: message(5, "materialized"),
        });

        assert_eq!(cache.get(&5).unwrap().text, "materialized");
        assert_eq!(cache.anomalies(), 1);
    }

    #[test]
    fn key_change_on_update_does_not_strand_the_old_row() {
        let mut cache = TableCache::<Message>::default();
        cache.apply(RowDelta::Insert(message(1, "a")));
        cache.apply(RowDelta::Update {
            old: message(1, "a"),
            new: message(2, "moved"),
        });

        assert_eq!(keys(&cache), vec![2]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut cache = TableCache::<Message>::default();
        cache.apply(RowDelta::Insert(message(1, "a")));
        cache.apply(RowDelta::Update {
            old: message(1, "stale"),
            new: message(1, "b"),
        });
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.anomalies(), 0);
    }
}
