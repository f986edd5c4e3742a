//! Partition File Compression
//!
//! Every page of a partition file is compressed with the catalog's
//! [`Codec`]. The codec name is recorded in the manifest, and the reader
//! checks that each column chunk was written with it.
//!
//! ## Codecs
//! - **None**: pages stored as encoded
//! - **Lz4**: Parquet `LZ4_RAW`
//! - **Snappy**: Parquet `SNAPPY`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    None,
    Lz4,
    Snappy,
}

impl Codec {
    pub const ALL: [Codec; 3] = [Codec::None, Codec::Lz4, Codec::Snappy];

    pub fn name(self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Lz4 => "lz4",
            Codec::Snappy => "snappy",
        }
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Codec::None),
            "lz4" => Ok(Codec::Lz4),
            "snappy" => Ok(Codec::Snappy),
            other => Err(Error::Configuration(format!(
                "unsupported compression `{other}` (supported: none, lz4, snappy)"
            ))),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for codec in Codec::ALL {
            assert_eq!(codec.name().parse::<Codec>().unwrap(), codec);
        }
        assert_eq!("SNAPPY".parse::<Codec>().unwrap(), Codec::Snappy);
    }

    #[test]
    fn test_unknown_codec_is_configuration_error() {
        assert!(matches!(
            "zstd".parse::<Codec>(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Codec::Snappy).unwrap(), r#""snappy""#);
        let codec: Codec = serde_json::from_str(r#""lz4""#).unwrap();
        assert_eq!(codec, Codec::Lz4);
        assert!(serde_json::from_str::<Codec>(r#""gzip""#).is_err());
    }
}
