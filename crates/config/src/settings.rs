use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use strata_compress::CompressionHint;

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scan: ScanSettings,
    pub cache: CacheSettings,
    pub store: StoreSettings,
}

impl Settings {
    /// Reject values that deserialize fine but cannot drive a scan.
    pub fn validate(&self) -> Result<()> {
        let scan = &self.scan;
        if scan.list_object_keys_size == 0 {
            exn::bail!(ErrorKind::Invalid("scan.list_object_keys_size must be positive".to_string()));
        }
        if scan.max_block_size == 0 {
            exn::bail!(ErrorKind::Invalid("scan.max_block_size must be positive".to_string()));
        }
        if scan.reader_pool_size == 0 {
            exn::bail!(ErrorKind::Invalid("scan.reader_pool_size must be positive".to_string()));
        }
        if self.cache.kind == CacheKind::Memory && self.cache.max_entries == 0 {
            exn::bail!(ErrorKind::Invalid("cache.max_entries must be positive".to_string()));
        }
        if let StoreSettings::S3 { bucket, .. } = &self.store
            && bucket.is_empty()
        {
            exn::bail!(ErrorKind::Invalid("store.bucket must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Scan behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Page size requested from the store when listing.
    pub list_object_keys_size: usize,
    /// Skip objects that vanish between enumeration and opening.
    pub ignore_non_existent_files: bool,
    /// Fail a glob scan that matches nothing instead of returning no rows.
    pub throw_on_zero_files_match: bool,
    /// Skip zero-byte objects without opening them.
    pub skip_empty_files: bool,
    /// Don't fetch object metadata for explicitly listed keys.
    pub skip_object_metadata: bool,
    pub use_cache_for_count: bool,
    pub use_cache_for_schema: bool,
    /// Prefix cache identifiers with the store's connection info (endpoint).
    pub include_connection_info: bool,
    /// Maximum rows per emitted batch.
    pub max_block_size: usize,
    /// Blocking threads available to readers for opening and decoding.
    pub reader_pool_size: usize,
    /// `auto` (by extension), `detect` (by magic bytes), or a format name.
    #[serde(with = "hint_serde")]
    pub compression: CompressionHint,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            list_object_keys_size: 1000,
            ignore_non_existent_files: false,
            throw_on_zero_files_match: false,
            skip_empty_files: false,
            skip_object_metadata: false,
            use_cache_for_count: true,
            use_cache_for_schema: true,
            include_connection_info: true,
            max_block_size: 8192,
            reader_pool_size: 4,
            compression: CompressionHint::Auto,
        }
    }
}

mod hint_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use strata_compress::CompressionHint;

    pub fn serialize<S: Serializer>(hint: &CompressionHint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(hint)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CompressionHint, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|e| D::Error::custom(format!("{e}")))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    None,
    #[default]
    Memory,
    Sqlite,
}

/// Row/schema cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub kind: CacheKind,
    /// Capacity of the in-memory cache.
    pub max_entries: usize,
    /// Age after which entries are ignored (memory) or pruned on open
    /// (sqlite). Unset means entries never expire.
    pub ttl_secs: Option<u64>,
    /// SQLite database file. Defaults to the user cache directory.
    pub path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            kind: CacheKind::Memory,
            max_entries: 10_000,
            ttl_secs: None,
            path: None,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Where objects are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreSettings {
    Local {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default = "default_region")]
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: String,
    },
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::Local {
            root: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strata_compress::Compression;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.scan.list_object_keys_size, 1000);
        assert_eq!(settings.scan.max_block_size, 8192);
        assert!(settings.scan.use_cache_for_count);
        assert!(!settings.scan.throw_on_zero_files_match);
        assert_eq!(settings.scan.compression, CompressionHint::Auto);
        assert_eq!(settings.cache.kind, CacheKind::Memory);
        assert!(settings.validate().is_ok());
    }

    #[rstest]
    #[case(|s: &mut Settings| s.scan.list_object_keys_size = 0)]
    #[case(|s: &mut Settings| s.scan.max_block_size = 0)]
    #[case(|s: &mut Settings| s.scan.reader_pool_size = 0)]
    #[case(|s: &mut Settings| s.cache.max_entries = 0)]
    fn test_validate_rejects(#[case] mutate: fn(&mut Settings)) {
        let mut settings = Settings::default();
        mutate(&mut settings);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_compression_round_trips_as_string() {
        let mut scan = ScanSettings::default();
        scan.compression = CompressionHint::Fixed(Compression::Gzip);
        let value = figment::Figment::from(figment::providers::Serialized::defaults(&scan));
        let back: ScanSettings = value.extract().unwrap();
        assert_eq!(back.compression, CompressionHint::Fixed(Compression::Gzip));
    }
}
