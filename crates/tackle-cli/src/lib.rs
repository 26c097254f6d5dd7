//! tackle - declarative, version-pinned tool runtime
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Tools are declared in `tackle.yaml` and resolved against registries.
//! Running a declared command installs its package on first use.
//!
//! # Directory Layout
//!
//! ```text
//! $TACKLE_ROOT_DIR/
//! ├── bin/          # Shims (symlinks to the tackle binary)
//! ├── pkgs/         # Installed packages by type/host/owner/repo/version
//! └── registries/   # Cached remote registries
//! ```

pub mod cmd;

use clap::{Parser, Subcommand};

/// Name the binary is invoked under when not running as a shim.
pub const BIN_NAME: &str = "tackle";

#[derive(Debug, Parser)]
#[command(name = "tackle")]
#[command(author, version, about = "tackle - run version-pinned tools, installing them on first use")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a command, installing its package if needed
    Exec {
        /// Command name
        exe_name: String,
        /// Arguments for the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print the path of the executable a command resolves to
    Which {
        /// Command name
        exe_name: String,
    },
    /// Install the packages of the nearest configuration and link shims
    Install {
        /// Only create shims, do not download packages
        #[arg(long, short = 'l')]
        only_link: bool,
    },
}

/// Command name when invoked through a shim, `None` when invoked as tackle.
///
/// # Example
///
/// ```
/// use tackle_cli::shim_name;
///
/// assert_eq!(shim_name("/home/me/.local/share/tackle/bin/gh"), Some("gh"));
/// assert_eq!(shim_name("/usr/local/bin/tackle"), None);
/// ```
pub fn shim_name(argv0: &str) -> Option<&str> {
    let name = std::path::Path::new(argv0).file_name()?.to_str()?;
    let name = name.strip_suffix(".exe").unwrap_or(name);
    (name != BIN_NAME && !name.is_empty()).then_some(name)
}
