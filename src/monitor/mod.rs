//! Availability monitoring: search candidates, poll their status, notify observers

pub mod availability;
pub mod candidate;
pub mod observer;

pub use availability::{
    AvailabilityMonitor, AvailabilitySource, MonitorReport, MonitorSettings, StopOutcome,
};
pub use candidate::{Candidate, RawCandidate, StatusKeywords, TicketStatus};
pub use observer::{ObserverList, TicketObserver};
