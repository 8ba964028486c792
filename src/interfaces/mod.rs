//! Host-facing interfaces: scenario input for the demo binary.

pub mod csv;
