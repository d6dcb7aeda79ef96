//! Load schedulers
//!
//! - `sustained`: normal mode, a fixed pool ticking at a per-session rate
//! - `churn`: swarm mode, create / operate once / close, repeated

pub mod churn;
pub mod sustained;

pub use churn::{ChurnOptions, ChurnScheduler};
pub use sustained::{SustainedOptions, SustainedReport, SustainedScheduler, build_pool};
