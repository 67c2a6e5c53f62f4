//! Content rewriting pipeline.
//!
//! Media type gating, URL pre-cleaning and re-signing, and the CSS and HTML
//! rewriters. Everything in here is pure: network and protocol concerns live
//! under `core::proxy`.

pub mod contenttype;
pub mod css;
pub mod html;
pub mod proxify;
pub mod uri;

pub use contenttype::{MediaType, MediaTypePredicate};
pub use proxify::{RequestContext, proxify_uri};
pub use uri::sanitize_uri;
