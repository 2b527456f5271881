use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Revision of the normalized destination schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    /// The most recent schema revision, used when none is requested.
    pub const LATEST: SchemaVersion = SchemaVersion::V2;

    /// Whether university surrogate keys carry over the legacy `Uni_ID`.
    ///
    /// V1 kept the legacy identifiers; from V2 on, keys are newly assigned
    /// rowids.
    pub fn carries_over_university_ids(&self) -> bool {
        matches!(self, SchemaVersion::V1)
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVersion::V1 => write!(f, "v1"),
            SchemaVersion::V2 => write!(f, "v2"),
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "v1" => Ok(SchemaVersion::V1),
            "2" | "v2" => Ok(SchemaVersion::V2),
            _ => Err(SchemaVersionError::UnknownVersion(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaVersionError {
    #[error("Unknown schema version: {0}")]
    UnknownVersion(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_is_default() {
        assert_eq!(SchemaVersion::default(), SchemaVersion::V2);
        assert_eq!(SchemaVersion::LATEST, SchemaVersion::V2);
    }

    #[test]
    fn test_schema_version_display() {
        assert_eq!(SchemaVersion::V1.to_string(), "v1");
        assert_eq!(SchemaVersion::V2.to_string(), "v2");
    }

    #[test]
    fn test_schema_version_from_str() {
        assert_eq!("v1".parse::<SchemaVersion>().unwrap(), SchemaVersion::V1);
        assert_eq!("1".parse::<SchemaVersion>().unwrap(), SchemaVersion::V1);
        assert_eq!("V2".parse::<SchemaVersion>().unwrap(), SchemaVersion::V2);
        assert_eq!("2".parse::<SchemaVersion>().unwrap(), SchemaVersion::V2);
    }

    #[test]
    fn test_schema_version_ordering() {
        assert!(SchemaVersion::V1 < SchemaVersion::V2);
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        assert!("v3".parse::<SchemaVersion>().is_err());
        assert!("latest".parse::<SchemaVersion>().is_err());
        assert!("".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_key_strategy_per_version() {
        assert!(SchemaVersion::V1.carries_over_university_ids());
        assert!(!SchemaVersion::V2.carries_over_university_ids());
    }
}
