use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized},
};
use path_clean::PathClean;
use serde::Serialize;

use crate::config::{CONFIG_FILE_NAME, KilnConfig};
use crate::error::{ConfigError, Result};

/// Environment variable prefix. Nested keys use `__`: `KILN_DEV__PORT=3000`.
pub const ENV_PREFIX: &str = "KILN_";

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "DevOverrides::is_empty")]
    pub dev: DevOverrides,
    #[serde(skip_serializing_if = "BuildOverrides::is_empty")]
    pub build: BuildOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DevOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmr: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,
}

impl DevOverrides {
    fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none() && self.hmr.is_none()
    }
}

impl BuildOverrides {
    fn is_empty(&self) -> bool {
        self.out_dir.is_none() && self.fail_fast.is_none()
    }
}

impl KilnConfig {
    /// Load configuration for the project in `base`.
    ///
    /// Priority: CLI overrides > `KILN_` environment variables > config file >
    /// defaults. Without an explicit `config_path`, `kiln.config.json` in `base`
    /// is used when present. The resulting `root` is resolved against `base`.
    pub fn load(
        base: &Path,
        config_path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(KilnConfig::default()));

        let config_file = match config_path {
            Some(path) => {
                let path = base.join(path);
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path));
                }
                Some(path)
            }
            None => {
                let default_path = base.join(CONFIG_FILE_NAME);
                default_path.is_file().then_some(default_path)
            }
        };

        if let Some(path) = &config_file {
            tracing::debug!(path = %path.display(), "loading config file");
            figment = figment.merge(Json::file(path));
        }

        figment = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides));

        let mut config: KilnConfig = figment.extract()?;
        config.root = base.join(&config.root).clean();
        Ok(config)
    }

    /// Parse a JSON document on top of the defaults, without touching the
    /// environment.
    pub fn from_json(json: &str) -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(KilnConfig::default()))
            .merge(Json::string(json))
            .extract()
            .map_err(ConfigError::from)
    }
}
