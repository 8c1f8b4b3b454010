//! Overlay errors.

use thiserror::Error;

/// Errors raised while resolving an address to a peer set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OverlayError {
    /// `Kalimero::lookup`/`allocate` was asked for `n != 1`: a
    /// single-node overlay has exactly one peer to offer.
    #[error("kalimero overlay only ever has one peer, requested {requested}")]
    SingleNodeOverlay {
        /// The `n` the caller asked for.
        requested: usize,
    },

    /// A static overlay was asked for more peers than it knows about.
    #[error("requested {requested} peers but the overlay only knows {known}")]
    InsufficientPeers {
        /// The `n` the caller asked for.
        requested: usize,
        /// Total peers currently known.
        known: usize,
    },

    /// `lookup_node` was given a node id the overlay has never seen.
    #[error("node id is not known to this overlay")]
    UnknownNode,

    /// A `Koordinate` composite has no backend overlays to delegate to.
    #[error("no backend overlay registered")]
    NoBackend,

    /// A peer-endpoint string failed to parse as `host:port`.
    #[error("malformed peer endpoint: {0}")]
    MalformedEndpoint(String),
}
