//! Request signing.

pub mod sign;
