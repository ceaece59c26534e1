//! Partition eddy-covariance net ecosystem exchange into ecosystem
//! respiration and gross primary productivity.
//!
//! This crate wires the regression engine of [`fluxpart_core`] and the
//! components of [`fluxpart_components`] into a file-to-file pipeline:
//! [`io`] reads and writes tables, [`config`] holds the run settings and
//! [`pipeline::run`] chains the stages.

pub mod config;
pub mod io;
pub mod pipeline;

pub use config::{ColumnNames, Config, TemperatureUnit};
pub use pipeline::{run, PartitionReport};
