pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod sink;

pub use error::{Result, TracelinkError};
