//! Configuration for bucketfan.
//!
//! Settings are layered with `figment`, later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default()`]).
//! 2. A configuration file, in TOML, YAML or JSON (picked by extension). When
//!    no path is given, `config.toml` in the platform configuration directory
//!    is used if it exists.
//! 3. Environment variables prefixed with `BUCKETFAN_`, nested keys split on
//!    `__` (e.g. `BUCKETFAN_SCANNER__WORKERS=8`).
//!
//! ```toml
//! [collector]
//! workers = 16
//! queue_capacity = 10000
//!
//! [scanner]
//! workers = 56
//!
//! [s3]
//! region = "us-west-004"
//! endpoint = "https://s3.us-west-004.backblazeb2.com"
//! key_id = "..."
//! key_secret = "..."
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use bucketfan_fanout::{DEFAULT_COLLECTOR_WORKERS, DEFAULT_SCANNER_WORKERS};
use bucketfan_pool::{DEFAULT_QUEUE_CAPACITY, PoolConfig};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The scanner fans out far wider than the collector, so it gets a deeper
/// queue as well.
pub const DEFAULT_SCANNER_QUEUE_CAPACITY: usize = 100_000;
const ENV_PREFIX: &str = "BUCKETFAN_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub collector: PoolSettings,
    pub scanner: PoolSettings,
    /// Connection details for an S3-compatible service. Only needed by
    /// commands that actually talk to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Settings>,
}

/// Sizing of one task pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    pub workers: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Settings {
    /// Used for logging only.
    #[serde(default = "S3Settings::default_name")]
    pub name: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services that aren't AWS.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
}

impl S3Settings {
    fn default_name() -> String {
        "s3".to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collector: PoolSettings {
                workers: DEFAULT_COLLECTOR_WORKERS,
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
            },
            scanner: PoolSettings {
                workers: DEFAULT_SCANNER_WORKERS,
                queue_capacity: DEFAULT_SCANNER_QUEUE_CAPACITY,
            },
            s3: None,
        }
    }
}

impl From<PoolSettings> for PoolConfig {
    fn from(settings: PoolSettings) -> Self {
        PoolConfig::new(settings.workers).with_queue_capacity(settings.queue_capacity)
    }
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    /// All configuration layers, without extracting them.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        match path {
            Some(path) => {
                std::fs::metadata(path).or_raise(|| ErrorKind::Load)?;
                figment = Self::merge_file(figment, path)?;
            },
            None => {
                if let Some(path) = Self::default_path().filter(|path| path.is_file()) {
                    figment = Self::merge_file(figment, &path)?;
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Where the configuration file lives when none is given.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "bucketfan").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        for (section, settings) in [("collector", &self.collector), ("scanner", &self.scanner)] {
            if settings.workers == 0 {
                exn::bail!(ErrorKind::Invalid(format!("{section}.workers must be at least 1")));
            }
        }
        if let Some(s3) = &self.s3 {
            for (field, value) in [("region", &s3.region), ("key_id", &s3.key_id), ("key_secret", &s3.key_secret)] {
                if value.trim().is_empty() {
                    exn::bail!(ErrorKind::Invalid(format!("s3.{field} must not be empty")));
                }
            }
        }
        Ok(())
    }

    /// The `[s3]` section, for commands that can't do without it.
    pub fn s3(&self) -> Result<&S3Settings> {
        self.s3
            .as_ref()
            .ok_or_else(|| exn::Exn::from(ErrorKind::Invalid("missing [s3] section".to_string())))
    }

    fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
        tracing::debug!(path = %path.display(), "loading configuration file");
        let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
        Ok(match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file_exact(path)),
            Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
            Some("json") => figment.merge(Json::file_exact(path)),
            _ => exn::bail!(ErrorKind::Invalid(format!("unsupported configuration format: {}", path.display()))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;
    use std::io::Write;

    fn write_config(extension: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(&format!(".{extension}")).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    /// Run `test` while no other test can touch the environment.
    fn isolated(test: impl FnOnce()) {
        Jail::expect_with(|_jail| {
            test();
            Ok(())
        });
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.collector.workers, 16);
        assert_eq!(config.collector.queue_capacity, 10_000);
        assert_eq!(config.scanner.workers, 56);
        assert_eq!(config.scanner.queue_capacity, 100_000);
        assert!(config.s3.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_pool_config_conversion() {
        let pool = PoolConfig::from(PoolSettings {
            workers: 3,
            queue_capacity: 7,
        });
        assert_eq!(pool, PoolConfig::new(3).with_queue_capacity(7));
    }

    #[rstest]
    #[case("toml", "[scanner]\nworkers = 8\n")]
    #[case("yaml", "scanner:\n  workers: 8\n")]
    #[case("yml", "scanner:\n  workers: 8\n")]
    #[case("json", r#"{"scanner": {"workers": 8}}"#)]
    fn test_file_overrides_defaults(#[case] extension: &str, #[case] content: &str) {
        isolated(|| {
            let file = write_config(extension, content);
            let config = Config::load(Some(file.path())).unwrap();
            assert_eq!(config.scanner.workers, 8);
            // Untouched keys keep their defaults, even inside a touched section.
            assert_eq!(config.scanner.queue_capacity, DEFAULT_SCANNER_QUEUE_CAPACITY);
            assert_eq!(config.collector.workers, DEFAULT_COLLECTOR_WORKERS);
        });
    }

    #[test]
    fn test_s3_section() {
        isolated(|| {
            let file = write_config(
                "toml",
                "[s3]\nregion = \"us-west-004\"\nendpoint = \"https://example.com\"\nkey_id = \"id\"\nkey_secret = \"secret\"\n",
            );
            let config = Config::load(Some(file.path())).unwrap();
            let s3 = config.s3().unwrap();
            assert_eq!(s3.name, "s3");
            assert_eq!(s3.region, "us-west-004");
            assert_eq!(s3.endpoint.as_deref(), Some("https://example.com"));
        });
    }

    #[test]
    fn test_missing_s3_section() {
        let err = Config::default().s3().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(message) if message.contains("[s3]")));
    }

    #[rstest]
    #[case("[collector]\nworkers = 0\n", "collector.workers")]
    #[case("[scanner]\nworkers = 0\n", "scanner.workers")]
    #[case("[s3]\nregion = \"\"\nkey_id = \"id\"\nkey_secret = \"secret\"\n", "s3.region")]
    fn test_validation(#[case] content: &str, #[case] field: &str) {
        isolated(|| {
            let file = write_config("toml", content);
            let err = Config::load(Some(file.path())).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(message) if message.contains(field)));
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(dir.path().join("nope.toml").as_path())).unwrap_err();
        assert_eq!(*err, ErrorKind::Load);
    }

    #[test]
    fn test_unsupported_format() {
        let file = write_config("ini", "workers=1");
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(message) if message.contains("unsupported")));
    }

    #[test]
    fn test_malformed_file() {
        isolated(|| {
            let file = write_config("toml", "[scanner\nworkers = ");
            let err = Config::load(Some(file.path())).unwrap_err();
            assert_eq!(*err, ErrorKind::Load);
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("bucketfan.toml", "[collector]\nworkers = 4\nqueue_capacity = 20\n")?;
            jail.set_env("BUCKETFAN_COLLECTOR__WORKERS", "2");
            jail.set_env("BUCKETFAN_S3__REGION", "eu-west-1");
            jail.set_env("BUCKETFAN_S3__KEY_ID", "id");
            jail.set_env("BUCKETFAN_S3__KEY_SECRET", "secret");
            let config = Config::load(Some(Path::new("bucketfan.toml"))).unwrap();
            assert_eq!(config.collector.workers, 2);
            assert_eq!(config.collector.queue_capacity, 20);
            assert_eq!(config.s3().unwrap().region, "eu-west-1");
            Ok(())
        });
    }
}
