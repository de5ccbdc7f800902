#![forbid(unsafe_code)]

pub mod browse_cli;
