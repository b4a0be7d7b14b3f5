use std::path::PathBuf;

use clap::{Args, Subcommand};
use kiln_config::{BuildOverrides, ConfigOverrides, DevOverrides};

/// Available kiln subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the development server
    ///
    /// Builds files as the browser requests them, watches the project and
    /// pushes hot module updates to connected pages.
    Dev(DevArgs),

    /// Build every mounted file and write the results to disk
    Build(BuildArgs),
}

/// Arguments for the dev command
#[derive(Args, Debug, Clone, Default)]
pub struct DevArgs {
    /// Port to listen on (default: 8080)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind (default: 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,

    /// Path to the config file (default: kiln.config.json in the root)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project root
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub root: PathBuf,

    /// Disable hot module replacement
    #[arg(long)]
    pub no_hmr: bool,
}

/// Arguments for the build command
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Output directory (default: dist)
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Path to the config file (default: kiln.config.json in the root)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project root
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub root: PathBuf,

    /// Keep going when a plugin fails, serving the file's raw contents
    #[arg(long)]
    pub no_fail_fast: bool,
}

impl DevArgs {
    /// Flags that take precedence over the config file and environment.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            dev: DevOverrides {
                host: self.host.clone(),
                port: self.port,
                hmr: self.no_hmr.then_some(false),
            },
            ..ConfigOverrides::default()
        }
    }
}

impl BuildArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            build: BuildOverrides {
                out_dir: self.out_dir.clone(),
                fail_fast: self.no_fail_fast.then_some(false),
            },
            ..ConfigOverrides::default()
        }
    }
}
