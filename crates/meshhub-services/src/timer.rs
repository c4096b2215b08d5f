//! Cancellable event timers.
//!
//! A timer does not touch mesh state. When it fires it posts an event,
//! stamped with the generation it was armed under, into the coordinator's
//! queue. Cancelling or re-arming bumps the generation, so a firing that was
//! already queued from an earlier arm is recognisably stale.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub struct EventTimer<E> {
    name: &'static str,
    events: mpsc::UnboundedSender<E>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl<E: Send + 'static> EventTimer<E> {
    pub fn new(name: &'static str, events: mpsc::UnboundedSender<E>) -> Self {
        Self {
            name,
            events,
            generation: 0,
            task: None,
        }
    }

    /// Post `make(generation)` once, `delay` from now. Replaces any prior arm.
    pub fn arm_once<F>(&mut self, delay: Duration, make: F) -> u64
    where
        F: FnOnce(u64) -> E + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(make(generation));
        }));
        tracing::debug!(timer = self.name, generation, ?delay, "timer armed");
        generation
    }

    /// Post `make(generation)` every `period`, first firing one period from
    /// now. Replaces any prior arm. Stops on its own if the queue closes.
    pub fn arm_periodic<F>(&mut self, period: Duration, make: F) -> u64
    where
        F: Fn(u64) -> E + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if events.send(make(generation)).is_err() {
                    return;
                }
            }
        }));
        tracing::debug!(timer = self.name, generation, ?period, "periodic timer armed");
        generation
    }

    /// Disarm. Any firing already queued becomes stale.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(timer = self.name, generation = self.generation, "timer cancelled");
        }
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// True iff `generation` belongs to the live arm.
    pub fn is_current(&self, generation: u64) -> bool {
        self.task.is_some() && self.generation == generation
    }
}

impl<E> Drop for EventTimer<E> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
