mod dataset;
mod engine;
mod error;

pub use dataset::load_dataset;
pub use engine::{Engine, EngineEvent, Subscription};
pub use error::EngineError;
