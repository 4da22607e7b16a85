//! Harness runs behind the `simulate` and `stress` subcommands

pub mod simulator;
pub mod stress;

pub use simulator::{run_simulator, SimulatorConfig, SimulatorReport};
pub use stress::{run_stress, StressConfig, StressReport};
