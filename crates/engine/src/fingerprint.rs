use crate::types::SourceUnit;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

const DOMAIN_TAG: &[u8] = b"typesage:analysis:v1";

/// Content address of an analysis request.
///
/// SHA-256 over a domain tag, the length-prefixed source text and the sorted
/// option names. Serialized as 64 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(unit: &SourceUnit) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_TAG);

        let text = unit.text.as_bytes();
        hasher.update((text.len() as u64).to_le_bytes());
        hasher.update(text);

        // Sorted by name, not by enum declaration order.
        let mut names: Vec<&str> = unit.options.iter().map(|o| o.as_ref()).collect();
        names.sort_unstable();
        hasher.update((names.len() as u64).to_le_bytes());
        for name in names {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
        }

        Self(hasher.finalize().into())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| EngineError::InvalidFingerprint(format!("{s}: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EngineError::InvalidFingerprint(format!("{s}: expected 32 bytes")))?;
        Ok(Self(bytes))
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisOption;

    #[test]
    fn test_deterministic() {
        let unit = SourceUnit::new("x = y + 1\n").with_option(AnalysisOption::ExternalInference);
        assert_eq!(Fingerprint::of(&unit), Fingerprint::of(&unit.clone()));
        assert_eq!(Fingerprint::of(&unit).to_hex().len(), 64);
    }

    #[test]
    fn test_options_change_fingerprint() {
        let plain = SourceUnit::new("x = y + 1\n");
        let external = plain.clone().with_option(AnalysisOption::ExternalInference);
        let both = external.clone().with_option(AnalysisOption::MemoryReuse);
        let reordered = SourceUnit::new("x = y + 1\n")
            .with_option(AnalysisOption::MemoryReuse)
            .with_option(AnalysisOption::ExternalInference);

        assert_ne!(Fingerprint::of(&plain), Fingerprint::of(&external));
        assert_ne!(Fingerprint::of(&external), Fingerprint::of(&both));
        assert_eq!(Fingerprint::of(&both), Fingerprint::of(&reordered));
    }

    #[test]
    fn test_text_is_exact() {
        let a = Fingerprint::of(&SourceUnit::new("x = 1"));
        let b = Fingerprint::of(&SourceUnit::new("x = 1 "));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_round_trip_and_errors() {
        let fp = Fingerprint::of(&SourceUnit::new("pass"));
        assert_eq!(fp.to_hex().parse::<Fingerprint>().unwrap(), fp);
        assert_eq!(fp.short().len(), 12);

        assert!("zz".parse::<Fingerprint>().is_err());
        assert!("abcd".parse::<Fingerprint>().is_err());

        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));
    }
}
