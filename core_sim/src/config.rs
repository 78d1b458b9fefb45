use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::addr::{ConfigurationError, Geometry};

/// cache geometry as written in a JSON config file.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub set_bits: i64,
    pub associativity: i64,
    pub block_bits: i64,
}

impl CacheConfig {
    pub fn deser(file: impl std::io::Read) -> Result<Self> {
        Ok(serde_json::from_reader(file)?)
    }
    pub fn geometry(&self) -> Result<Geometry, ConfigurationError> {
        Geometry::new(self.set_bits, self.associativity, self.block_bits)
    }
}

impl From<Geometry> for CacheConfig {
    fn from(g: Geometry) -> Self {
        Self {
            set_bits: g.set_bits().into(),
            associativity: g.associativity() as i64,
            block_bits: g.block_bits().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deser() {
        let json = r#"{"set_bits": 5, "associativity": 1, "block_bits": 5}"#;
        let c = CacheConfig::deser(json.as_bytes()).unwrap();
        let g = c.geometry().unwrap();
        assert_eq!(32, g.num_sets());
        assert_eq!(1, g.associativity());
        assert_eq!(c, CacheConfig::from(g));
    }
    #[test]
    fn test_deser_rejects() {
        let unknown = r#"{"set_bits": 1, "associativity": 1, "block_bits": 1, "policy": "fifo"}"#;
        assert!(CacheConfig::deser(unknown.as_bytes()).is_err());
        let missing = r#"{"set_bits": 1, "block_bits": 1}"#;
        assert!(CacheConfig::deser(missing.as_bytes()).is_err());
        let negative = r#"{"set_bits": 1, "associativity": -4, "block_bits": 1}"#;
        let c = CacheConfig::deser(negative.as_bytes()).unwrap();
        assert_eq!(
            Err(ConfigurationError::Negative {
                param: "E",
                value: -4
            }),
            c.geometry()
        );
    }
}
