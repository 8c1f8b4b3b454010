//! # Overlay
//!
//! Address-to-peer resolution. The [`Overlay`] trait answers "who owns
//! address A?" and "what peers do we currently know about?"; `Kalimero`,
//! `Stonehenge`, and `Koordinate` are the three concrete answers this
//! workspace ships.

pub mod errors;
pub mod kalimero;
pub mod koordinate;
pub mod location;
pub mod stonehenge;
pub mod traits;

pub use errors::OverlayError;
pub use kalimero::Kalimero;
pub use koordinate::Koordinate;
pub use location::{parse_endpoints, PeerLocation};
pub use stonehenge::Stonehenge;
pub use traits::{majority, Overlay};
