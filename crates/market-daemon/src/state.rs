//! Shared runtime state for market-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; `AppState` itself owns
//! nothing beyond the engine handle and static build metadata.

use std::sync::Arc;

use market_engine::Engine;

#[derive(Clone, Copy)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

pub struct AppState {
    pub engine: Arc<Engine>,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            build: BuildInfo {
                service: "market-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
