//! Checks that run after loading, before anything is served.

use rustc_hash::FxHashSet;

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

impl KilnConfig {
    /// Validate mounts, the HMR endpoint and the port.
    ///
    /// Mounted directories must exist, mount URLs must be absolute and unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = FxHashSet::default();
        for mount in self.resolved_mounts() {
            if !mount.url.starts_with('/') {
                return Err(ConfigError::InvalidMountUrl(mount.url));
            }
            let normalized = mount.url.trim_end_matches('/');
            if !seen.insert(normalized.to_string()) {
                return Err(ConfigError::DuplicateMountUrl(mount.url));
            }
            if !mount.dir.is_dir() {
                return Err(ConfigError::MountNotFound(mount.dir));
            }
        }

        if !self.dev.hmr_path.starts_with('/') {
            return Err(ConfigError::InvalidHmrPath(self.dev.hmr_path.clone()));
        }
        if self.dev.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        Ok(())
    }
}
