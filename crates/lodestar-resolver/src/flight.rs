//! Coalescing of identical in-flight queries.  However many callers
//! ask for the same (name, qtype) at once, one resolution runs and
//! every caller gets its result.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};

use lodestar_wire::protocol::types::{Message, Name, RecordType};

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] pending-map mutex poisoned, cannot recover from this - aborting";

/// The coalescing key.
pub(crate) type Key = (Name, RecordType);

/// The table of in-flight resolutions and the work queue feeding the
/// dispatcher.
///
/// Lock discipline: the pending-map mutex is only ever held for a map
/// operation, never across an await point.
pub(crate) struct Flights {
    pending: Mutex<HashMap<Key, watch::Sender<Option<Message>>>>,
    submit: mpsc::UnboundedSender<Key>,
}

/// One caller's handle on an in-flight resolution.
pub(crate) struct Waiter {
    rx: watch::Receiver<Option<Message>>,
}

impl Waiter {
    /// Wait for the resolution to complete.  `None` if the producer
    /// went away without completing, which only happens at shutdown.
    pub(crate) async fn wait(mut self) -> Option<Message> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        }
    }
}

impl Flights {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Key>) {
        let (submit, work) = mpsc::unbounded_channel();
        let flights = Self {
            pending: Mutex::new(HashMap::new()),
            submit,
        };
        (flights, work)
    }

    /// Join the flight for a key, creating it and queuing the key for
    /// the dispatcher if nothing is in flight yet.
    ///
    /// A caller who joins before the result is produced is guaranteed
    /// to see it: the pending entry is only removed at completion
    /// time, and the channel retains the completed value.
    pub(crate) fn join(&self, key: Key) -> Waiter {
        let mut pending = self.pending.lock().expect(MUTEX_POISON_MESSAGE);

        if let Some(tx) = pending.get(&key) {
            return Waiter { rx: tx.subscribe() };
        }

        let (tx, rx) = watch::channel(None);
        pending.insert(key.clone(), tx);
        // the queue is unbounded: the only send error is a dropped
        // dispatcher, at which point waiters are going away anyway
        let _ = self.submit.send(key);
        Waiter { rx }
    }

    /// Deliver the result for a key, waking every waiter.  Waiters
    /// which were cancelled in the meantime are ignored silently.
    pub(crate) fn complete(&self, key: &Key, message: Message) {
        let tx = self
            .pending
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .remove(key);

        if let Some(tx) = tx {
            let _ = tx.send(Some(message));
        }
    }

    /// Whether a flight is active for the key.
    #[cfg(test)]
    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.pending
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use lodestar_wire::protocol::types::{Question, Rcode};

    use super::*;

    fn key(name: &str, qtype: RecordType) -> Key {
        (Name::new(name), qtype)
    }

    fn completed_message(name: &str, qtype: RecordType) -> Message {
        let mut message = Message::from_question(
            0,
            Question {
                name: Name::new(name),
                qtype,
            },
        )
        .make_response();
        message.header.rcode = Rcode::NoError;
        message
    }

    #[tokio::test]
    async fn join_enqueues_each_key_once() {
        let (flights, mut work) = Flights::new();

        let first = flights.join(key("www.example.com", RecordType::A));
        let second = flights.join(key("www.example.com", RecordType::A));
        let other = flights.join(key("www.example.com", RecordType::AAAA));

        assert_eq!(
            Some(key("www.example.com", RecordType::A)),
            work.recv().await
        );
        assert_eq!(
            Some(key("www.example.com", RecordType::AAAA)),
            work.recv().await
        );
        assert!(work.try_recv().is_err());

        drop((first, second, other));
    }

    #[tokio::test]
    async fn complete_wakes_every_waiter() {
        let (flights, _work) = Flights::new();
        let k = key("www.example.com", RecordType::A);

        let first = flights.join(k.clone());
        let second = flights.join(k.clone());

        let message = completed_message("www.example.com", RecordType::A);
        flights.complete(&k, message.clone());

        assert_eq!(Some(message.clone()), first.wait().await);
        assert_eq!(Some(message), second.wait().await);
        assert!(!flights.contains(&k));
    }

    #[tokio::test]
    async fn complete_with_no_waiters_is_silent() {
        let (flights, _work) = Flights::new();
        let k = key("www.example.com", RecordType::A);

        let waiter = flights.join(k.clone());
        drop(waiter);

        flights.complete(&k, completed_message("www.example.com", RecordType::A));
        assert!(!flights.contains(&k));
    }

    #[tokio::test]
    async fn a_key_completed_and_rejoined_is_a_new_flight() {
        let (flights, mut work) = Flights::new();
        let k = key("www.example.com", RecordType::A);

        let first = flights.join(k.clone());
        flights.complete(&k, completed_message("www.example.com", RecordType::A));
        assert!(first.wait().await.is_some());

        let _second = flights.join(k.clone());
        assert!(flights.contains(&k));

        work.recv().await.unwrap();
        assert_eq!(Some(k), work.recv().await);
    }
}
