//! Static HTML chrome.

pub mod ui;
