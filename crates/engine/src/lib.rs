pub mod buffer;
pub mod context;
pub mod release;
pub mod trigger;

pub use trigger::{AggregationEngine, TriggerConfig};
