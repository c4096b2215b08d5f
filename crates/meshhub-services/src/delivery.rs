//! Delivery log: remembers which logical deliveries were admitted during
//! the current awake cycle, so an exact retransmission is processed once.

use std::collections::{HashSet, VecDeque};

use meshhub_core::wire::DeliveryKey;

/// Enough for several full poll rounds across a small mesh.
const DEFAULT_CAPACITY: usize = 256;

pub struct DeliveryLog {
    seen: HashSet<DeliveryKey>,
    order: VecDeque<DeliveryKey>,
    capacity: usize,
}

impl Default for DeliveryLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DeliveryLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Has this delivery already been admitted?
    pub fn contains(&self, key: &DeliveryKey) -> bool {
        self.seen.contains(key)
    }

    /// Record a delivery. Returns false if it was already recorded.
    /// The oldest key is forgotten once the log is full.
    pub fn record(&mut self, key: DeliveryKey) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}
