//! Table loading and result writing around the `edmf` core.
//!
//! The core consumes parsed, validated tables; this crate reads them from a
//! directory of CSV files and writes the candidate model set and the run
//! summary back out for the `edmf` binary.

pub mod io;
