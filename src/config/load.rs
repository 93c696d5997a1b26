use std::{
    env, fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use super::SettingsError;
use super::schema::Settings;

/// Key/value persistence for `Settings`.
pub trait SettingsStore {
    fn load(&self) -> Result<Settings, SettingsError>;
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// A TOML file store with environment overrides on load.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: Option<PathBuf>,
}

impl FileStore {
    /// Store at `TONEARM_CONFIG_PATH` or the XDG default.
    pub fn from_env() -> Self {
        Self {
            path: resolve_config_path(),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl SettingsStore for FileStore {
    /// Load settings from environment and optional config file.
    fn load(&self) -> Result<Settings, SettingsError> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = &self.path {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("TONEARM")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let path = self.path.as_ref().ok_or(SettingsError::NoPath)?;
        let content = toml::to_string_pretty(settings)?;

        let write = |p: &Path| -> std::io::Result<()> {
            if let Some(parent) = p.parent() {
                fs::create_dir_all(parent)?;
            }
            // The previous file stays intact until the rename.
            let tmp = p.with_extension("toml.tmp");
            fs::write(&tmp, content.as_bytes())?;
            fs::rename(&tmp, p)
        };
        write(path).map_err(|source| SettingsError::Write {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "settings saved");
        Ok(())
    }
}

impl Settings {
    /// Load from `store`, falling back to defaults when the stored data is
    /// missing, unparsable or out of range. Never fails.
    pub fn load_or_default(store: &impl SettingsStore) -> Settings {
        match store.load() {
            Ok(s) => match s.validate() {
                Ok(()) => s,
                Err(e) => {
                    warn!("invalid config, using defaults: {e}");
                    Settings::default()
                }
            },
            Err(e) => {
                // Config is optional; failures should not prevent the engine from starting.
                warn!("failed to load config, using defaults: {e}");
                Settings::default()
            }
        }
    }
}

/// Resolve the config path from `TONEARM_CONFIG_PATH` or XDG defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("TONEARM_CONFIG_PATH") {
        return Some(PathBuf::from(p));
    }
    default_config_path()
}

/// Compute the default config path under `$XDG_CONFIG_HOME/tonearm/config.toml`
/// or `~/.config/tonearm/config.toml` when `XDG_CONFIG_HOME` is not set.
pub fn default_config_path() -> Option<PathBuf> {
    let config_home = if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    };

    config_home.map(|d| d.join("tonearm").join("config.toml"))
}
