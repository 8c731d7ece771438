//! Configuration management
//!
//! Settings are resolved per key in three tiers: the `SECTION_KEY`
//! environment variable, then `[section] key = value` in an INI file, then a
//! caller-supplied default. [`Settings`] is the typed view handed to each
//! pipeline component at construction.

use dcm2pdf_common::{PipelineError, Result};
use sqlx::postgres::PgConnectOptions;
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Config file read when no explicit path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.ini";

/// Root of the remote archive that `study.filepath` values are relative to.
pub const DEFAULT_ARCHIVE_ROOT: &str = "/union/pacs-data/archive";

pub const DEFAULT_SSH_PORT: u16 = 22;

pub const DEFAULT_DATABASE_HOST: &str = "localhost";

pub const DEFAULT_DATABASE_PORT: u16 = 5432;

pub const DEFAULT_DATABASE_NAME: &str = "irg";

pub const DEFAULT_DATABASE_USER: &str = "postgres";

pub const DEFAULT_DOWNLOAD_DIRECTORY: &str = "./downloads";

pub const DEFAULT_OUTPUT_DIRECTORY: &str = "./pdfs";

/// Default number of studies fetched per batch.
pub const DEFAULT_BATCH_LIMIT: usize = 10;

pub const DEFAULT_SOURCE_EXTENSION: &str = "dcm";

pub const DEFAULT_TARGET_EXTENSION: &str = "pdf";

/// Keyed setting lookup: environment first, then the INI file, then a default.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    file: Option<config::Config>,
    source: Option<PathBuf>,
}

impl ConfigResolver {
    /// Load the resolver, reading `.env` into the process environment first.
    ///
    /// An explicit `path` must be readable. Without one, [`DEFAULT_CONFIG_PATH`]
    /// is used if it exists; otherwise only the environment and defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    tracing::debug!(path = DEFAULT_CONFIG_PATH, "No config file, using environment and defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Load an INI file. Fails if the file is missing or malformed.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::config(format!(
                "config file '{}' not found or not readable",
                path.display()
            )));
        }

        let file = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Ini))
            .build()
            .map_err(|e| PipelineError::config(format!("{}: {}", path.display(), e)))?;

        tracing::info!(path = %path.display(), "Loaded configuration file");

        Ok(Self {
            file: Some(file),
            source: Some(path.to_path_buf()),
        })
    }

    /// Build a resolver from INI text.
    pub fn from_ini_str(ini: &str) -> Result<Self> {
        let file = config::Config::builder()
            .add_source(config::File::from_str(ini, config::FileFormat::Ini))
            .build()
            .map_err(|e| PipelineError::config(e.to_string()))?;

        Ok(Self {
            file: Some(file),
            source: None,
        })
    }

    /// Path of the loaded config file, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Name of the environment variable overriding `section.key`
    pub fn env_key(section: &str, key: &str) -> String {
        format!("{}_{}", section, key).to_uppercase()
    }

    /// Look up a setting without a default
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        if let Ok(value) = std::env::var(Self::env_key(section, key)) {
            return Some(value);
        }

        self.file
            .as_ref()?
            .get_string(&format!("{}.{}", section, key))
            .ok()
    }

    /// Look up a setting, falling back to `default`. Never fails.
    pub fn resolve(&self, section: &str, key: &str, default: &str) -> String {
        self.get(section, key).unwrap_or_else(|| default.to_string())
    }

    /// Look up a setting that has no usable default
    pub fn require(&self, section: &str, key: &str) -> Result<String> {
        match self.get(section, key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(PipelineError::config(format!(
                "missing required setting [{}] {} (or {})",
                section,
                key,
                Self::env_key(section, key)
            ))),
        }
    }

    fn parse<T: std::str::FromStr>(&self, section: &str, key: &str, default: T) -> Result<T> {
        match self.get(section, key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| {
                PipelineError::config(format!("invalid value '{}' for [{}] {}", raw, section, key))
            }),
        }
    }
}

/// Remote archive (SFTP) settings
#[derive(Clone)]
pub struct RemoteSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub archive_root: String,
}

impl std::fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("archive_root", &self.archive_root)
            .finish()
    }
}

/// Relational store settings
#[derive(Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl DatabaseSettings {
    /// Connection options for a single scoped connection
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

#[derive(Debug, Clone)]
pub struct ConverterSettings {
    pub executable_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    /// Staging directory for fetched source files
    pub download_directory: PathBuf,
    /// Directory receiving converted documents
    pub output_directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_limit: usize,
    pub source_extension: String,
    pub target_extension: String,
}

/// Typed settings for every pipeline component
#[derive(Debug, Clone)]
pub struct Settings {
    pub remote: RemoteSettings,
    pub database: DatabaseSettings,
    pub converter: ConverterSettings,
    pub paths: PathSettings,
    pub pipeline: PipelineSettings,
}

impl Settings {
    /// Resolve all settings. Fails only for missing required keys or
    /// unparseable numbers.
    pub fn from_resolver(resolver: &ConfigResolver) -> Result<Self> {
        let settings = Self {
            remote: RemoteSettings {
                host: resolver.require("remote", "host")?,
                port: resolver.parse("remote", "port", DEFAULT_SSH_PORT)?,
                user: resolver.resolve("remote", "user", ""),
                password: resolver.resolve("remote", "password", ""),
                archive_root: resolver.resolve("remote", "archive_root", DEFAULT_ARCHIVE_ROOT),
            },
            database: DatabaseSettings {
                host: resolver.resolve("database", "host", DEFAULT_DATABASE_HOST),
                port: resolver.parse("database", "port", DEFAULT_DATABASE_PORT)?,
                database: resolver.resolve("database", "database", DEFAULT_DATABASE_NAME),
                user: resolver.resolve("database", "user", DEFAULT_DATABASE_USER),
                password: resolver.resolve("database", "password", ""),
            },
            converter: ConverterSettings {
                executable_path: PathBuf::from(resolver.require("converter", "executable_path")?),
            },
            paths: PathSettings {
                download_directory: PathBuf::from(resolver.resolve(
                    "paths",
                    "download_directory",
                    DEFAULT_DOWNLOAD_DIRECTORY,
                )),
                output_directory: PathBuf::from(resolver.resolve(
                    "paths",
                    "output_directory",
                    DEFAULT_OUTPUT_DIRECTORY,
                )),
            },
            pipeline: PipelineSettings {
                batch_limit: resolver.parse("pipeline", "batch_limit", DEFAULT_BATCH_LIMIT)?,
                source_extension: resolver.resolve(
                    "pipeline",
                    "source_extension",
                    DEFAULT_SOURCE_EXTENSION,
                ),
                target_extension: resolver.resolve(
                    "pipeline",
                    "target_extension",
                    DEFAULT_TARGET_EXTENSION,
                ),
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_limit == 0 {
            return Err(PipelineError::config("pipeline.batch_limit must be greater than 0"));
        }

        for (name, ext) in [
            ("source_extension", &self.pipeline.source_extension),
            ("target_extension", &self.pipeline.target_extension),
        ] {
            if ext.is_empty() || ext.contains(['.', '/', '\\']) {
                return Err(PipelineError::config(format!(
                    "pipeline.{} must be a bare extension, got '{}'",
                    name, ext
                )));
            }
        }

        if self.pipeline.source_extension == self.pipeline.target_extension
            && self.paths.download_directory == self.paths.output_directory
        {
            return Err(PipelineError::config(
                "converted files would overwrite their sources: use distinct extensions or directories",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const INI: &str = r#"
[remote]
host = archive.local
user = animati
password = secret

[database]
host = filehost
database = pacs

[converter]
executable_path = /opt/dcmtk/bin/dcm2pdf

[paths]
download_directory = /var/spool/dcm
"#;

    #[test]
    #[serial]
    fn test_env_override_wins_over_file() {
        std::env::set_var("DATABASE_HOST", "envhost");
        let resolver = ConfigResolver::from_ini_str(INI).unwrap();

        assert_eq!(resolver.resolve("database", "host", "default"), "envhost");

        std::env::remove_var("DATABASE_HOST");
        assert_eq!(resolver.resolve("database", "host", "default"), "filehost");
    }

    #[test]
    #[serial]
    fn test_default_when_absent_everywhere() {
        std::env::remove_var("DATABASE_SCHEMA");
        let resolver = ConfigResolver::from_ini_str(INI).unwrap();

        assert_eq!(resolver.resolve("database", "schema", "public"), "public");
        assert_eq!(resolver.resolve("nosection", "key", ""), "");
        assert!(resolver.get("nosection", "key").is_none());
    }

    #[test]
    fn test_env_key_is_uppercased() {
        assert_eq!(ConfigResolver::env_key("paths", "download_directory"), "PATHS_DOWNLOAD_DIRECTORY");
    }

    #[test]
    fn test_explicit_missing_file_is_config_error() {
        let err = ConfigResolver::from_file(Path::new("/nonexistent/config.ini")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    #[serial]
    fn test_settings_from_file() {
        let resolver = ConfigResolver::from_ini_str(INI).unwrap();
        let settings = Settings::from_resolver(&resolver).unwrap();

        assert_eq!(settings.remote.host, "archive.local");
        assert_eq!(settings.remote.port, DEFAULT_SSH_PORT);
        assert_eq!(settings.remote.archive_root, DEFAULT_ARCHIVE_ROOT);
        assert_eq!(settings.database.database, "pacs");
        assert_eq!(settings.database.user, DEFAULT_DATABASE_USER);
        assert_eq!(settings.converter.executable_path, PathBuf::from("/opt/dcmtk/bin/dcm2pdf"));
        assert_eq!(settings.paths.download_directory, PathBuf::from("/var/spool/dcm"));
        assert_eq!(settings.paths.output_directory, PathBuf::from(DEFAULT_OUTPUT_DIRECTORY));
        assert_eq!(settings.pipeline.batch_limit, DEFAULT_BATCH_LIMIT);
    }

    #[test]
    #[serial]
    fn test_missing_converter_is_fatal() {
        std::env::remove_var("CONVERTER_EXECUTABLE_PATH");
        let resolver = ConfigResolver::from_ini_str("[remote]\nhost = archive.local\n").unwrap();
        let err = Settings::from_resolver(&resolver).unwrap_err();

        assert!(err.is_fatal());
        assert!(err.to_string().contains("CONVERTER_EXECUTABLE_PATH"));
    }

    #[test]
    #[serial]
    fn test_unparseable_number_rejected() {
        let ini = format!("{}\n[pipeline]\nbatch_limit = ten\n", INI);
        let resolver = ConfigResolver::from_ini_str(&ini).unwrap();
        assert!(Settings::from_resolver(&resolver).is_err());
    }

    #[test]
    #[serial]
    fn test_debug_redacts_passwords() {
        let resolver = ConfigResolver::from_ini_str(INI).unwrap();
        let settings = Settings::from_resolver(&resolver).unwrap();
        let rendered = format!("{:?}", settings);

        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("archive.local"));
    }
}
