#![forbid(unsafe_code)]

pub mod common;
pub mod content;
pub mod hierarchy;

pub use common::{ContractViolation, ReasonCodeId, Validate};
