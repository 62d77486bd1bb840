//! Transport classes and the capability filter used to request a network.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// The category of network interface a request must travel over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportClass {
    /// Whatever network the platform currently considers active.
    ///
    /// Never acquired, only borrowed.
    #[default]
    Default,
    /// Wi-Fi only.
    Wifi,
    /// Cellular only.
    Cellular,
}

/// Physical medium a non-default transport class requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMedium {
    /// IEEE 802.11 wireless LAN.
    Wifi,
    /// Mobile data (LTE, 5G, ...).
    Cellular,
}

/// Returned when a transport string does not name a [`TransportClass`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transport class '{value}': expected one of default, wifi, cellular")]
pub struct UnknownTransport {
    /// The rejected input.
    pub value: String,
}

impl TransportClass {
    /// Returns the medium this class must be acquired on, or `None` for
    /// [`TransportClass::Default`], which is never acquired.
    #[must_use]
    pub fn medium(self) -> Option<TransportMedium> {
        match self {
            Self::Default => None,
            Self::Wifi => Some(TransportMedium::Wifi),
            Self::Cellular => Some(TransportMedium::Cellular),
        }
    }

    /// Returns the stable upper-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Wifi => "WIFI",
            Self::Cellular => "CELLULAR",
        }
    }
}

impl fmt::Display for TransportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportClass {
    type Err = UnknownTransport;

    /// Parses a transport class case-insensitively.
    ///
    /// `ANY` and `STANDARD` are accepted as older names for `DEFAULT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEFAULT" | "ANY" | "STANDARD" => Ok(Self::Default),
            "WIFI" | "WI-FI" => Ok(Self::Wifi),
            "CELLULAR" => Ok(Self::Cellular),
            _ => Err(UnknownTransport {
                value: s.to_string(),
            }),
        }
    }
}

impl From<TransportMedium> for TransportClass {
    fn from(medium: TransportMedium) -> Self {
        match medium {
            TransportMedium::Wifi => Self::Wifi,
            TransportMedium::Cellular => Self::Cellular,
        }
    }
}

/// Capability filter handed to the connectivity service.
///
/// Expresses "must carry general internet traffic AND must use this medium".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkFilter {
    /// Required transport medium.
    pub medium: TransportMedium,
    /// Whether the network must support general internet traffic.
    pub require_internet: bool,
}

impl NetworkFilter {
    /// Builds the filter used for every acquisition: internet-capable and on `medium`.
    #[must_use]
    pub fn for_medium(medium: TransportMedium) -> Self {
        Self {
            medium,
            require_internet: true,
        }
    }
}
