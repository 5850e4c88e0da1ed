use crate::Settings;
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format as _, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "STRATA_";
const DEFAULT_FILE_NAME: &str = "strata.toml";
const DEFAULT_CACHE_FILE_NAME: &str = "scan-cache.sqlite";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "strata")
}

/// `strata.toml` in the platform's per-user configuration directory.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
}

fn default_cache_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.cache_dir().join(DEFAULT_CACHE_FILE_NAME))
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

impl Settings {
    /// Build the layered [`Figment`] without extracting it.
    ///
    /// An explicit `path` must exist. Without one, the default configuration
    /// file is used if present.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Settings::default()));
        let figment = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => file_provider(figment, path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => file_provider(figment, &path)?,
                None => figment,
            },
        };
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load, fill in derived defaults, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings: Settings = Self::figment(path)?.extract().or_raise(|| ErrorKind::Load)?;
        if settings.cache.path.is_none() {
            settings.cache.path = default_cache_path();
        }
        settings.validate()?;
        tracing::debug!(?settings.scan, cache = ?settings.cache.kind, "configuration loaded");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheKind, StoreSettings};
    use figment::Jail;
    use strata_compress::{Compression, CompressionHint};

    #[test]
    fn test_toml_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "strata.toml",
                r#"
                    [scan]
                    list_object_keys_size = 50
                    throw_on_zero_files_match = true
                    compression = "gzip"

                    [cache]
                    kind = "sqlite"
                    path = "/tmp/strata-cache.sqlite"

                    [store]
                    kind = "s3"
                    bucket = "events"
                    endpoint = "http://localhost:9000"
                    key_id = "id"
                    key_secret = "secret"
                "#,
            )?;
            jail.set_env("STRATA_SCAN__MAX_BLOCK_SIZE", "16");
            let settings = Settings::load(Some(Path::new("strata.toml"))).unwrap();
            assert_eq!(settings.scan.list_object_keys_size, 50);
            assert!(settings.scan.throw_on_zero_files_match);
            assert_eq!(settings.scan.max_block_size, 16);
            // Untouched keys keep their defaults.
            assert_eq!(settings.scan.reader_pool_size, 4);
            assert_eq!(settings.scan.compression, CompressionHint::Fixed(Compression::Gzip));
            assert_eq!(settings.cache.kind, CacheKind::Sqlite);
            assert_eq!(settings.cache.path, Some(PathBuf::from("/tmp/strata-cache.sqlite")));
            match settings.store {
                StoreSettings::S3 { bucket, region, .. } => {
                    assert_eq!(bucket, "events");
                    assert_eq!(region, "us-east-1");
                },
                other => panic!("unexpected store {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_yaml_and_json_files() {
        Jail::expect_with(|jail| {
            jail.create_file("strata.yaml", "scan:\n  skip_empty_files: true\n")?;
            jail.create_file("strata.json", r#"{"cache": {"kind": "none"}}"#)?;
            let yaml = Settings::load(Some(Path::new("strata.yaml"))).unwrap();
            assert!(yaml.scan.skip_empty_files);
            let json = Settings::load(Some(Path::new("strata.json"))).unwrap();
            assert_eq!(json.cache.kind, CacheKind::None);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|_jail| {
            let err = Settings::load(Some(Path::new("nope.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("strata.ini", "")?;
            let err = Settings::load(Some(Path::new("strata.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_value_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("strata.toml", "[scan]\ncompression = \"lz4\"\n")?;
            let err = Settings::load(Some(Path::new("strata.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            jail.create_file("zero.toml", "[scan]\nmax_block_size = 0\n")?;
            let err = Settings::load(Some(Path::new("zero.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }
}
