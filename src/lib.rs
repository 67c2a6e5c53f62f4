//! Library definitions.
//!
//! Exports the content rewriting pipeline, the proxy service and the
//! configuration types.

pub mod config;
pub mod core;
pub mod sanitize;
pub mod security;
pub mod web;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use crate::config::{Cli, MortyError, ProxyConfig, Result};
pub use crate::core::proxy::MortyProxy;
pub use crate::core::proxy::client::build_client;
pub use crate::core::proxy::dispatch::{Dispatcher, ProxyResponse};
pub use crate::sanitize::contenttype::MediaType;
pub use crate::sanitize::css::rewrite_css;
pub use crate::sanitize::html::sanitize_html;
pub use crate::sanitize::proxify::{RequestContext, proxify_uri};
pub use crate::sanitize::uri::sanitize_uri;
