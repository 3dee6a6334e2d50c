use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A capability a provider can offer.
///
/// Providers are indexed by capability in the registry; a provider may
/// declare any non-empty subset of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Chat,
    Embedding,
    Stt,
    Tts,
}

impl Capability {
    /// Every capability the gateway understands.
    pub const ALL: [Capability; 4] = [
        Capability::Chat,
        Capability::Embedding,
        Capability::Stt,
        Capability::Tts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Chat => "chat",
            Capability::Embedding => "embedding",
            Capability::Stt => "stt",
            Capability::Tts => "tts",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown capability name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid capability: {0}")]
pub struct InvalidCapability(pub String);

impl FromStr for Capability {
    type Err = InvalidCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Capability::Chat),
            "embedding" => Ok(Capability::Embedding),
            "stt" => Ok(Capability::Stt),
            "tts" => Ok(Capability::Tts),
            other => Err(InvalidCapability(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_capabilities() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
    }

    #[test]
    fn rejects_unknown_capability() {
        let err = "vision".parse::<Capability>().unwrap_err();
        assert_eq!(err, InvalidCapability("vision".to_string()));
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Capability::Stt).unwrap(), "\"stt\"");
    }
}
