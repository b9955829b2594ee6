//! Conversations driven by the transports.
//!
//! Each flow is an explicit state enum with a pure transition function plus
//! the `Engine` methods that perform the side effects of a step.

pub mod code_wait;
pub mod rental;
pub mod returns;
