//! Per-key computation coalescing.
//!
//! # Responsibilities
//! - Admit at most one in-flight computation per key
//! - Hand late arrivals a receiver for the leader's result
//! - Recover if a leader unwinds without publishing

use crate::errors::DependencyError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

type FlightResult = Result<Value, DependencyError>;

/// Table of in-flight computations, keyed by cache key.
#[derive(Debug, Default)]
pub(crate) struct FlightTable {
    flights: DashMap<String, broadcast::Sender<FlightResult>>,
}

/// Outcome of attempting to join a flight.
pub(crate) enum FlightRole<'a> {
    /// This caller computes; everyone else waits on it.
    Leader(FlightGuard<'a>),
    /// Another caller is computing; await its broadcast.
    Waiter(broadcast::Receiver<FlightResult>),
}

impl FlightTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, becoming leader if none is in progress.
    pub(crate) fn join(&self, key: &str) -> FlightRole<'_> {
        match self.flights.entry(key.to_string()) {
            Entry::Occupied(occupied) => FlightRole::Waiter(occupied.get().subscribe()),
            Entry::Vacant(vacant) => {
                let (tx, _rx) = broadcast::channel(1);
                vacant.insert(tx.clone());
                FlightRole::Leader(FlightGuard {
                    table: self,
                    key: key.to_string(),
                    tx,
                    published: false,
                })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

/// Leader's handle on a flight.
///
/// Dropping without publishing clears the flight so waiters observe a closed
/// channel and re-enter instead of hanging.
pub(crate) struct FlightGuard<'a> {
    table: &'a FlightTable,
    key: String,
    tx: broadcast::Sender<FlightResult>,
    published: bool,
}

impl FlightGuard<'_> {
    /// Remove the flight, then fan the result out to waiters.
    ///
    /// Removal happens first so a caller arriving after completion starts a
    /// fresh flight rather than subscribing to a finished one.
    pub(crate) fn publish(mut self, result: FlightResult) {
        self.table.flights.remove(&self.key);
        self.published = true;
        let _ = self.tx.send(result);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.table.flights.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_leader_then_waiter() {
        let table = FlightTable::new();

        let leader = match table.join("k") {
            FlightRole::Leader(g) => g,
            FlightRole::Waiter(_) => panic!("first joiner must lead"),
        };

        let mut rx = match table.join("k") {
            FlightRole::Waiter(rx) => rx,
            FlightRole::Leader(_) => panic!("second joiner must wait"),
        };

        leader.publish(Ok(Value::from(42)));
        let got = rx.recv().await.unwrap().unwrap();
        assert_eq!(got, Value::from(42));
        assert_eq!(table.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_flight_unblocks_waiters() {
        let table = FlightTable::new();

        let leader = match table.join("k") {
            FlightRole::Leader(g) => g,
            FlightRole::Waiter(_) => panic!("first joiner must lead"),
        };
        let mut rx = match table.join("k") {
            FlightRole::Waiter(rx) => rx,
            FlightRole::Leader(_) => panic!("second joiner must wait"),
        };

        drop(leader);
        assert!(rx.recv().await.is_err(), "channel must close, not hang");
        assert_eq!(table.in_flight(), 0);

        // The key is free again
        assert!(matches!(table.join("k"), FlightRole::Leader(_)));
    }
}
