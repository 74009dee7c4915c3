//! Command-line arguments
use clap::{Parser, Subcommand};
use container::bootstrap::config::{DEFAULT_ENVIRONMENT, ENVIRONMENT_ENV_VAR};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "devstack",
    version,
    about = "Local multi-container development environments"
)]
pub struct Cli {
    /// Environment to operate on
    #[arg(
        short = 'e',
        long,
        global = true,
        env = ENVIRONMENT_ENV_VAR,
        default_value = DEFAULT_ENVIRONMENT
    )]
    pub environment: String,

    #[arg(long = "config-dir", global = true, help = "Config directory (default: ~/.devstack)")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Create the environment's network, volume and proxy, then apply sites
    Init {
        /// Only bootstrap the proxy
        #[arg(long)]
        skip_apply: bool,
    },

    /// Create, keep, or rebuild the container of every configured site
    Apply,

    /// Export the proxy's root certificate
    Trust {
        /// Destination file (default: <config dir>/certs/<environment>.crt)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run composer in a disposable container for the current directory
    #[command(disable_help_flag = true)]
    Composer {
        /// Arguments for composer; `--composer-version <v>` picks the image
        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            required = true,
            num_args = 1..
        )]
        args: Vec<String>,
    },
}

impl Cli {
    /// Directory holding `<environment>.toml` site files
    pub fn resolve_config_dir(&self, home: &std::path::Path) -> PathBuf {
        self.config_dir
            .clone()
            .unwrap_or_else(|| home.join(".devstack"))
    }
}
