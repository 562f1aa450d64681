use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "tern", about = "A static type checker for Python sources.")]
pub(crate) struct Args {
    /// Files to check.
    #[arg(required = true)]
    pub(crate) files: Vec<PathBuf>,

    /// Workspace root; defaults to the current directory.
    #[arg(long)]
    pub(crate) root: Option<PathBuf>,

    /// Target Python version, e.g. `3.8`.
    #[arg(long, value_name = "MAJOR.MINOR")]
    pub(crate) python_version: Option<String>,

    /// Target platform: Darwin, Linux or Windows.
    #[arg(long, value_name = "PLATFORM")]
    pub(crate) python_platform: Option<String>,

    /// Directory containing the typeshed stub tree.
    #[arg(long, value_name = "DIR")]
    pub(crate) typeshed: Option<PathBuf>,

    /// Directory containing local type stubs.
    #[arg(long, value_name = "DIR")]
    pub(crate) typings: Option<PathBuf>,

    /// Additional import search roots.
    #[arg(long = "extra-path", value_name = "DIR")]
    pub(crate) extra_paths: Vec<PathBuf>,

    /// Directory containing virtual environments.
    #[arg(long, value_name = "DIR")]
    pub(crate) venv_path: Option<PathBuf>,

    /// Virtual environment to use under the venv path.
    #[arg(long, value_name = "NAME")]
    pub(crate) venv: Option<String>,

    /// Check every file in strict mode.
    #[arg(long)]
    pub(crate) strict: bool,

    /// Use verbose output (repeat for more).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,
}
