//! Core proxy machinery.

pub mod proxy;
