//! CLI command implementations.

pub mod inspect;
pub mod relay;
pub mod reseed;
