//! A coalescing, caching, recursive DNS resolver.
//!
//! The resolver answers `(name, qtype)` questions from a record cache
//! seeded with root hints; on a miss it walks the nameserver
//! hierarchy itself.  Identical questions asked concurrently are
//! coalesced: one resolution runs, every caller shares the result.
//! With a fixed upstream list configured it degenerates into a
//! forwarding proxy instead of walking from the roots.

#![warn(clippy::pedantic)]
// Sometimes a redundant else is clearer
#![allow(clippy::redundant_else)]
// Don't care enough to fix
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::wildcard_imports)]

pub mod cache;
mod flight;
mod local;
pub mod net;
mod remote;

use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::Instrument;

use lodestar_wire::hints::RootHints;
use lodestar_wire::hosts::Hosts;
use lodestar_wire::protocol::types::*;

use self::cache::SharedCache;
use self::flight::{Flights, Key};

/// How long a caller waits for an answer before giving up.  The
/// resolution itself keeps running so that later callers coalescing
/// onto it can still be served.
pub const QUERY_DEADLINE: Duration = Duration::from_secs(3);

/// Iteration bound on the remote resolver's working list.  A chain of
/// CNAMEs longer than this cannot be resolved; without the bound a
/// malicious upstream could keep the walk alive forever.
pub const CHASE_LIMIT: usize = 16;

/// The address record types, in the sense of "everything a
/// nameserver hostname can resolve to".
pub(crate) const ADDRESS_TYPES: [RecordType; 2] = [RecordType::A, RecordType::AAAA];

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name served from the `1.0.0.127.in-addr.arpa` PTR record.
    pub server_name: String,

    /// DNS suffixes this resolver is authoritative for, with their
    /// leading dot (e.g. `.lan`).
    pub authority_suffixes: Vec<String>,

    /// Fixed upstreams.  When set, nameserver discovery is skipped
    /// and every remote query goes to these servers: the proxy mode.
    pub upstreams: Option<Vec<IpAddr>>,

    /// Port remote nameservers are queried on.
    pub upstream_port: u16,

    /// Whether CNAMEs are chased on the caller's behalf.  Also
    /// reported in the RA header flag.
    pub recursion_available: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: "lodestard".to_string(),
            authority_suffixes: Vec::new(),
            upstreams: None,
            upstream_port: 53,
            recursion_available: true,
        }
    }
}

/// A handle on the resolver.  Cloning is cheap and every clone shares
/// the cache, the pending-query table, and the dispatcher.
///
/// Must be constructed inside a tokio runtime: construction spawns
/// the dispatcher task.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    cache: SharedCache,
    flights: Flights,
}

impl Resolver {
    /// Build a resolver: seed the cache and start the dispatcher.
    ///
    /// The seeds are the root hints, the optional hosts file, and a
    /// PTR record mapping the loopback address back to
    /// `config.server_name`.
    pub fn new(config: Config, hints: &RootHints, hosts: Option<&Hosts>) -> Self {
        let cache = SharedCache::new();

        cache.insert(&Record::permanent(
            Name::new("1.0.0.127.in-addr.arpa"),
            RData::PTR {
                ptrdname: Name::new(&config.server_name),
            },
        ));
        for record in &hints.records {
            cache.insert(record);
        }
        if let Some(hosts) = hosts {
            for record in hosts.records() {
                cache.insert(&record);
            }
        }

        let (flights, work) = Flights::new();
        let inner = Arc::new(Inner {
            config,
            cache,
            flights,
        });

        tokio::spawn(dispatch(Arc::downgrade(&inner), work));

        Self { inner }
    }

    /// Resolve a question, coalescing with any identical question
    /// already in flight.
    ///
    /// `None` means the deadline passed; the caller should treat it
    /// as a soft failure.  The resolution task is not cancelled, so a
    /// retry will usually join it or hit its cached results.
    pub async fn query(&self, name: &Name, qtype: RecordType) -> Option<Message> {
        let waiter = self.inner.flights.join((name.clone(), qtype));
        match timeout(QUERY_DEADLINE, waiter.wait()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(%name, %qtype, "query deadline exceeded");
                None
            }
        }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Resolve one dequeued key and deliver the result to its
    /// waiters.
    async fn resolve_key(&self, key: Key) {
        let (name, qtype) = &key;

        let mut res = Message {
            header: Header {
                id: 0,
                is_response: true,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: self.inner.config.recursion_available,
                rcode: Rcode::NoError,
            },
            questions: vec![Question {
                name: name.clone(),
                qtype: *qtype,
            }],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        };

        let mut done = local::resolve_cached(self, &mut res, name, *qtype).await;
        if !done {
            done = remote::resolve_remote(self, &mut res, name, *qtype).await;
        }
        if !done {
            res.header.rcode = Rcode::ServerFailure;
        }

        tracing::debug!(
            rcode = %res.header.rcode,
            answers = %res.answers.len(),
            "resolved"
        );
        self.inner.flights.complete(&key, res);
    }
}

/// The dispatcher: take each key off the work queue and spawn a
/// resolution task for it.  Ends when the last `Resolver` handle is
/// dropped.
async fn dispatch(inner: Weak<Inner>, mut work: mpsc::UnboundedReceiver<Key>) {
    while let Some(key) = work.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        let resolver = Resolver { inner };
        let span =
            tracing::error_span!("resolve", name = %key.0, qtype = %key.1);
        tokio::spawn(async move { resolver.resolve_key(key).await }.instrument(span));
    }
}
