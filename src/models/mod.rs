pub mod common;
pub mod negotiation;
