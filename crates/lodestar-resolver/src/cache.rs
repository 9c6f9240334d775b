use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lodestar_wire::protocol::types::{Name, RData, Record, RecordType, TTL_PERMANENT};

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

/// A convenience wrapper around a `Cache` which lets it be shared
/// between tasks.
///
/// Invoking `clone` on a `SharedCache` gives a new instance which
/// refers to the same underlying `Cache` object.
#[derive(Debug, Clone, Default)]
pub struct SharedCache {
    cache: Arc<Mutex<Cache>>,
}

impl SharedCache {
    /// Make a new, empty, shared cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the unexpired records of the given type at a name.  `ANY`
    /// matches every type.
    ///
    /// The TTL in a returned `Record` is the time remaining, not the
    /// TTL it was inserted with; permanent records keep their `-1`.
    pub fn get(&self, name: &Name, qtype: RecordType) -> Vec<Record> {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).get(name, qtype)
    }

    /// Like `get`, but matching any of a set of types.
    pub fn get_any_of(&self, name: &Name, qtypes: &[RecordType]) -> Vec<Record> {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .get_any_of(name, qtypes)
    }

    /// Insert a record under its name.
    ///
    /// A record with a zero TTL is not inserted at all; a negative
    /// TTL makes the entry permanent.  A permanent entry is never
    /// displaced by a later insert of the same data.
    pub fn insert(&self, record: &Record) {
        if record.ttl != 0 {
            self.cache
                .lock()
                .expect(MUTEX_POISON_MESSAGE)
                .insert(record);
        }
    }

    /// Atomically delete all expired records, returning how many were
    /// removed.
    pub fn prune(&self) -> usize {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .remove_expired()
    }

    /// The number of records currently held, expired or not.
    pub fn len(&self) -> usize {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).current_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caching for `Record`s, keyed by owner name.
///
/// You probably want to use `SharedCache` instead.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    /// Cached records, indexed by domain name.
    entries: HashMap<Name, Vec<Entry>>,

    /// Priority queue of domain names ordered by expiry time, used to
    /// prune expired records without scanning the whole map.
    ///
    /// INVARIANT: a name is in here iff it has at least one expiring
    /// (non-permanent) entry, with a priority no later than that
    /// entry's expiry.
    expiry_priority: PriorityQueue<Name, Reverse<Instant>>,

    /// The number of records in the cache.
    ///
    /// INVARIANT: this is the sum of the vector lengths in `entries`.
    current_size: usize,
}

/// One cached record.  The owner name is the map key; `None` for
/// `expires_at` marks a permanent entry.
#[derive(Debug, Clone, Eq, PartialEq)]
struct Entry {
    rdata: RData,
    expires_at: Option<Instant>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &Name, qtype: RecordType) -> Vec<Record> {
        self.get_matching(name, |rdata| rdata.rtype().matches(qtype))
    }

    pub fn get_any_of(&self, name: &Name, qtypes: &[RecordType]) -> Vec<Record> {
        self.get_matching(name, |rdata| qtypes.contains(&rdata.rtype()))
    }

    fn get_matching<F: Fn(&RData) -> bool>(&self, name: &Name, matches: F) -> Vec<Record> {
        let now = Instant::now();
        let Some(entries) = self.entries.get(name) else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for entry in entries {
            // a record in its final fraction of a second counts as
            // expired too, rather than going out with a zero TTL
            let ttl = match entry.expires_at {
                None => TTL_PERMANENT,
                Some(expires_at) => {
                    match i64::try_from(expires_at.saturating_duration_since(now).as_secs()) {
                        Ok(remaining) if remaining > 0 => remaining,
                        _ => continue,
                    }
                }
            };
            if matches(&entry.rdata) {
                records.push(Record {
                    name: name.clone(),
                    rdata: entry.rdata.clone(),
                    ttl,
                });
            }
        }
        records
    }

    pub fn insert(&mut self, record: &Record) {
        if record.ttl == 0 {
            return;
        }

        let expires_at = match u64::try_from(record.ttl) {
            Ok(ttl) => Some(Instant::now() + Duration::from_secs(ttl)),
            Err(_) => None,
        };

        let entries = self.entries.entry(record.name.clone()).or_default();
        if let Some(existing) = entries.iter_mut().find(|e| e.rdata == record.rdata) {
            // a permanent entry outranks whatever the network says
            if existing.expires_at.is_some() {
                existing.expires_at = expires_at;
            }
        } else {
            entries.push(Entry {
                rdata: record.rdata.clone(),
                expires_at,
            });
            self.current_size += 1;
        }

        if let Some(expires_at) = expires_at {
            self.expiry_priority
                .push_increase(record.name.clone(), Reverse(expires_at));
        }
    }

    /// Delete all expired records.
    ///
    /// Returns the number of records deleted.
    pub fn remove_expired(&mut self) -> usize {
        let now = Instant::now();
        let mut pruned = 0;

        while let Some((name, Reverse(expiry))) = self.expiry_priority.pop() {
            if expiry > now {
                self.expiry_priority.push(name, Reverse(expiry));
                break;
            }

            if let Some(entries) = self.entries.get_mut(&name) {
                let len = entries.len();
                entries.retain(|e| match e.expires_at {
                    Some(expires_at) => expires_at > now,
                    None => true,
                });
                pruned += len - entries.len();
                self.current_size -= len - entries.len();

                // an entry whose expiry was refreshed after its name
                // was queued can survive the sweep: requeue it
                let next_expiry = entries.iter().filter_map(|e| e.expires_at).min();
                if let Some(next_expiry) = next_expiry {
                    self.expiry_priority.push(name, Reverse(next_expiry));
                } else if entries.is_empty() {
                    self.entries.remove(&name);
                }
            }
        }

        pruned
    }
}
