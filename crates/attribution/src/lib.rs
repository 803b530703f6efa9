//! Attribution rules.
//!
//! Decides whether a (product, affiliate) pair may receive a click or a conversion, and
//! records clicks as immutable facts. Pure domain logic; lookups happen in the caller.

pub mod click;
pub mod marker;
pub mod target;

pub use click::{Click, ClickMetadata};
pub use marker::{AttributionMarker, landing_url};
pub use target::ensure_attributable;
