//! Billing acts for snow removal contracts: trip selection and claiming, pricing, act
//! numbering, landfill approval, and per-organization trip reports.

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod ledger;
pub mod model;
pub mod principal;
pub mod renderer;
pub mod report;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Installs the global fmt subscriber once. `RUST_LOG` overrides the `snow_acts=info` default.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt};

        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = "snow_acts=info".parse() {
            filter = filter.add_directive(directive);
        }

        let _ = fmt().with_env_filter(filter).try_init();
        tracing::info!("snow_acts tracing initialized");
    });
}
