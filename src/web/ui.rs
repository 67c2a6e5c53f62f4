//! UI rendering.

pub mod pages;
