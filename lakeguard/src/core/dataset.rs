//! Dataset descriptors and fingerprints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GuardError;

/// Pipeline stage a dataset belongs to.
///
/// `Bronze` holds raw ingested data, `Silver` cleaned data, and `Gold`
/// business-ready data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bronze => write!(f, "bronze"),
            Self::Silver => write!(f, "silver"),
            Self::Gold => write!(f, "gold"),
        }
    }
}

impl FromStr for Layer {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bronze" | "raw" => Ok(Self::Bronze),
            "silver" | "cleaned" => Ok(Self::Silver),
            "gold" | "business" => Ok(Self::Gold),
            other => Err(GuardError::configuration(format!(
                "Unknown layer '{other}', expected bronze, silver, or gold"
            ))),
        }
    }
}

/// The (content_hash, schema_hash, row_count) tuple identifying one dataset
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub content_hash: String,
    pub schema_hash: String,
    pub row_count: u64,
}

/// Immutable snapshot describing one validation target at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Pipeline layer the dataset lives in
    pub layer: Layer,
    /// Dataset name within the layer
    pub name: String,
    /// Storage path or handle
    pub path: String,
    /// Number of rows in the snapshot
    pub row_count: u64,
    /// Hash of the data content
    pub content_hash: String,
    /// Hash of the schema
    pub schema_hash: String,
}

impl Dataset {
    /// Creates a new dataset descriptor.
    pub fn new(
        layer: Layer,
        name: impl Into<String>,
        path: impl Into<String>,
        row_count: u64,
        content_hash: impl Into<String>,
        schema_hash: impl Into<String>,
    ) -> Self {
        Self {
            layer,
            name: name.into(),
            path: path.into(),
            row_count,
            content_hash: content_hash.into(),
            schema_hash: schema_hash.into(),
        }
    }

    /// Returns the layer-qualified identifier, e.g. `gold/fact_sales`.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.layer, self.name)
    }

    /// Returns the fingerprint tuple for change detection and cache keys.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            content_hash: self.content_hash.clone(),
            schema_hash: self.schema_hash.clone(),
            row_count: self.row_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_parsing() {
        assert_eq!("gold".parse::<Layer>().unwrap(), Layer::Gold);
        assert_eq!("Bronze".parse::<Layer>().unwrap(), Layer::Bronze);
        assert_eq!("cleaned".parse::<Layer>().unwrap(), Layer::Silver);
        assert!("platinum".parse::<Layer>().is_err());
    }

    #[test]
    fn test_layer_round_trip() {
        for layer in [Layer::Bronze, Layer::Silver, Layer::Gold] {
            assert_eq!(layer.to_string().parse::<Layer>().unwrap(), layer);
        }
    }

    #[test]
    fn test_fingerprint_equality() {
        let ds = Dataset::new(Layer::Gold, "fact_sales", "/data/gold", 1000, "abc", "def");
        let same = Dataset::new(Layer::Gold, "fact_sales", "/other", 1000, "abc", "def");
        assert_eq!(ds.fingerprint(), same.fingerprint());
        assert_eq!(ds.qualified_name(), "gold/fact_sales");
    }
}
