//! `PeerLocation`: a `host:port` endpoint, the unit the overlay hands to
//! the dock when it wants a connection opened.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::OverlayError;

/// A dialable network endpoint. Parsing is from an in-memory `&str`
/// slice; reading an actual peer-endpoint file from disk is the
/// out-of-scope CLI bootstrap concern (§6, "Peer endpoint file").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerLocation {
    /// Hostname or literal IP address.
    pub host: String,
    /// TCP (or UTP) port.
    pub port: u16,
}

impl PeerLocation {
    /// Build a location directly from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl FromStr for PeerLocation {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| OverlayError::MalformedEndpoint(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| OverlayError::MalformedEndpoint(s.to_string()))?;
        if host.is_empty() {
            return Err(OverlayError::MalformedEndpoint(s.to_string()));
        }
        Ok(PeerLocation::new(host, port))
    }
}

impl fmt::Display for PeerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse a peer-endpoint list, one `host:port` per line; blank lines and
/// `#`-prefixed comments are skipped. Matches the on-disk format from
/// §6 ("Peer endpoint file"), but operates on an already-read string so
/// it stays independent of any particular bootstrap/config loader.
pub fn parse_endpoints(text: &str) -> Result<Vec<PeerLocation>, OverlayError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PeerLocation::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let loc: PeerLocation = "peer-a.example.com:4009".parse().unwrap();
        assert_eq!(loc.host, "peer-a.example.com");
        assert_eq!(loc.port, 4009);
    }

    #[test]
    fn rejects_missing_port() {
        assert!("peer-a.example.com".parse::<PeerLocation>().is_err());
    }

    #[test]
    fn endpoint_list_skips_blanks_and_comments() {
        let text = "# bootstrap peers\n10.0.0.1:4009\n\n10.0.0.2:4009\n";
        let parsed = parse_endpoints(text).unwrap();
        assert_eq!(parsed, vec![PeerLocation::new("10.0.0.1", 4009), PeerLocation::new("10.0.0.2", 4009)]);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let loc = PeerLocation::new("127.0.0.1", 9000);
        let parsed: PeerLocation = loc.to_string().parse().unwrap();
        assert_eq!(loc, parsed);
    }
}
