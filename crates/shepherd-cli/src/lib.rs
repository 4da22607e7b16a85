//! Shepherd CLI - command line harness for the Shepherd workspace
//!
//! Runs the two load-bearing behaviours end to end:
//! 1. **Aggregate save cycle**: an order and its lines are created, edited,
//!    saved through an in-memory broker and reloaded
//! 2. **Serialized dispatch**: concurrent increments against many entities
//!    must all land exactly once
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use shepherd_cli::test_harness::{run_simulator, SimulatorConfig};
//!
//! let report = run_simulator(SimulatorConfig::default()).await?;
//! println!("{}", report.generate_text());
//! ```

pub mod cli;
pub mod logging;
pub mod records;
pub mod test_harness;

pub use cli::{Cli, Commands};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
