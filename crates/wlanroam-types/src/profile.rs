//! Network profiles: what the caller asks to join, and what a session
//! remembers about the network it joined.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mac::MacAddress;

/// Service set identifier. Kept as raw bytes; display lossily decodes UTF-8.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ssid(pub Vec<u8>);

impl Ssid {
    /// Build from a UTF-8 string
    pub fn from_str_lossy(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ssid({})", self)
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for Ssid {
    fn from(s: &str) -> Self {
        Self::from_str_lossy(s)
    }
}

/// Radio band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    TwoGhz,
    FiveGhz,
    SixGhz,
}

/// Channel: number plus band (channel numbers repeat across bands)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub number: u8,
    pub band: Band,
}

impl Channel {
    /// Convenience constructor
    pub fn new(number: u8, band: Band) -> Self {
        Self { number, band }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let band = match self.band {
            Band::TwoGhz => "2.4GHz",
            Band::FiveGhz => "5GHz",
            Band::SixGhz => "6GHz",
        };
        write!(f, "ch{}/{}", self.number, band)
    }
}

/// Channel constraint carried by a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPolicy {
    /// Any channel the candidate store offers
    Any,
    /// Restrict to one band
    Band(Band),
    /// Exactly this channel
    Fixed(Channel),
}

impl ChannelPolicy {
    /// Does `channel` satisfy this policy?
    pub fn allows(&self, channel: Channel) -> bool {
        match self {
            ChannelPolicy::Any => true,
            ChannelPolicy::Band(band) => channel.band == *band,
            ChannelPolicy::Fixed(fixed) => channel == *fixed,
        }
    }
}

/// Negotiated security family.
///
/// The engine never touches key material; it only needs to know whether a
/// post-association handshake is expected and whether the profile uses a
/// strong authentication exchange (which gets a bounded association-timeout
/// retry budget during joins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityProtocol {
    Open,
    Wpa2Personal,
    Wpa3Personal,
    Wpa2Enterprise,
}

impl SecurityProtocol {
    /// True when association must be followed by a key handshake before the
    /// link carries data.
    pub fn requires_handshake(&self) -> bool {
        !matches!(self, SecurityProtocol::Open)
    }

    /// True for SAE/802.1X-class exchanges where association timeouts are
    /// retried on the same candidate.
    pub fn strong_auth(&self) -> bool {
        matches!(
            self,
            SecurityProtocol::Wpa3Personal | SecurityProtocol::Wpa2Enterprise
        )
    }
}

/// What the caller asks the engine to join (or to serve, for AP mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub ssid: Ssid,
    pub security: SecurityProtocol,
    pub channel_policy: ChannelPolicy,
}

impl Profile {
    /// Open-security profile on any channel
    pub fn open(ssid: impl Into<Ssid>) -> Self {
        Self {
            ssid: ssid.into(),
            security: SecurityProtocol::Open,
            channel_policy: ChannelPolicy::Any,
        }
    }

    /// Profile with the given security, any channel
    pub fn secured(ssid: impl Into<Ssid>, security: SecurityProtocol) -> Self {
        Self {
            ssid: ssid.into(),
            security,
            channel_policy: ChannelPolicy::Any,
        }
    }
}

/// Snapshot of the association a session currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedProfile {
    pub ssid: Ssid,
    pub bssid: MacAddress,
    pub security: SecurityProtocol,
    pub channel: Channel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_policy() {
        let ch6 = Channel::new(6, Band::TwoGhz);
        let ch36 = Channel::new(36, Band::FiveGhz);

        assert!(ChannelPolicy::Any.allows(ch6));
        assert!(ChannelPolicy::Band(Band::TwoGhz).allows(ch6));
        assert!(!ChannelPolicy::Band(Band::TwoGhz).allows(ch36));
        assert!(ChannelPolicy::Fixed(ch36).allows(ch36));
        assert!(!ChannelPolicy::Fixed(ch36).allows(ch6));
    }

    #[test]
    fn test_security_classification() {
        assert!(!SecurityProtocol::Open.requires_handshake());
        assert!(SecurityProtocol::Wpa2Personal.requires_handshake());
        assert!(!SecurityProtocol::Wpa2Personal.strong_auth());
        assert!(SecurityProtocol::Wpa3Personal.strong_auth());
    }

    #[test]
    fn test_ssid_display() {
        let ssid: Ssid = "lab-net".into();
        assert_eq!(ssid.to_string(), "lab-net");
    }
}
