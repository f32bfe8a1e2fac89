//! Command-line harness that drives the Trident motion core against a
//! simulated delta printer.

pub mod cli;
pub mod config;
