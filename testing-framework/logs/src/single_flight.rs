//! Run-or-join collapsing of concurrent executions.
//!
//! [`SingleFlight::run`] starts the supplied body when nothing is running and
//! otherwise waits for the body that is already in flight, handing every
//! caller a clone of its result. Nothing is cached: once a run completes the
//! next call starts a fresh one.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{
    FutureExt as _,
    future::{BoxFuture, Shared},
};
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlightError {
    #[error("in-flight run aborted before producing a result")]
    Aborted,
}

type Flight<T> = Shared<BoxFuture<'static, Result<T, FlightError>>>;

struct Slot<T> {
    generation: u64,
    running: Option<Flight<T>>,
}

pub struct SingleFlight<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                running: None,
            })),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.slot).running.is_some()
    }

    /// Starts `body` if idle, otherwise joins the current run; `body` is
    /// dropped unused in the latter case. The body runs on its own task so a
    /// caller going away does not abort it for the others.
    pub async fn run<F, Fut>(&self, body: F) -> Result<T, FlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut slot = lock(&self.slot);
            if let Some(running) = &slot.running {
                debug!(generation = slot.generation, "joining in-flight run");
                running.clone()
            } else {
                slot.generation += 1;
                let generation = slot.generation;
                let flight = self.start(generation, body());
                slot.running = Some(flight.clone());
                flight
            }
        };

        flight.await
    }

    fn start<Fut>(&self, generation: u64, body: Fut) -> Flight<T>
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let release = Release {
            slot: Arc::clone(&self.slot),
            generation,
        };
        let task = tokio::spawn(async move {
            let _release = release;
            body.await
        });

        async move { task.await.map_err(|_| FlightError::Aborted) }
            .boxed()
            .shared()
    }
}

/// Frees the slot when the run finishes, including by panic.
struct Release<T> {
    slot: Arc<Mutex<Slot<T>>>,
    generation: u64,
}

impl<T> Drop for Release<T> {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot.generation == self.generation {
            slot.running = None;
        }
    }
}

fn lock<T>(slot: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
