//! Availability observers
//!
//! Observers run synchronously on the monitor task, in registration order.
//! One observer failing or panicking never keeps the others from running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

use super::candidate::TicketStatus;
use crate::error::Result;

/// Receives buyable statuses from the availability monitor
pub trait TicketObserver: Send + Sync {
    fn on_available(&self, status: &TicketStatus) -> Result<()>;
}

impl<F> TicketObserver for F
where
    F: Fn(&TicketStatus) -> Result<()> + Send + Sync,
{
    fn on_available(&self, status: &TicketStatus) -> Result<()> {
        self(status)
    }
}

/// Ordered list of named observers
#[derive(Clone, Default)]
pub struct ObserverList {
    observers: Vec<(String, Arc<dyn TicketObserver>)>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, observer: Arc<dyn TicketObserver>) {
        self.observers.push((name.into(), observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Invoke every observer in order. Returns how many completed without error.
    pub fn notify(&self, status: &TicketStatus) -> usize {
        let mut delivered = 0;

        for (name, observer) in &self.observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_available(status))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Observer '{}' failed: {}", name, e),
                Err(panic) => error!("Observer '{}' panicked: {}", name, panic_message(&*panic)),
            }
        }

        delivered
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
