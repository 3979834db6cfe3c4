use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "unipm",
    about = "One interface to the package managers of several languages",
    version
)]
pub struct Cli {
    /// Language backend to use (see `list-languages`); detected if omitted
    #[arg(short, long, global = true, value_name = "NAME")]
    pub lang: Option<String>,

    /// Config file [default: ./.unipm/config.toml, fallback ~/.config/unipm/config.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "terminal", value_name = "FORMAT")]
    pub format: ReportFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress progress output and notes
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the backend that applies to this project
    WhichLanguage,

    /// List every supported backend
    ListLanguages,

    /// Search the registry for packages whose name contains QUERY
    Search { query: String },

    /// Show registry metadata for a package
    Info { name: String },

    /// Add packages; each argument is `name` or `name spec`
    Add {
        packages: Vec<String>,

        /// Also add packages guessed from the project's imports
        #[arg(short, long)]
        guess: bool,

        /// Project name used when the specfile has to be created
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Remove packages from the specfile
    Remove {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Update the lockfile from the specfile
    Lock {
        /// Lock even if nothing changed since the last run
        #[arg(short, long)]
        force: bool,
    },

    /// Install the packages in the lockfile
    Install {
        /// Install even if the lockfile did not change since the last run
        #[arg(short, long)]
        force: bool,
    },

    /// List the packages declared in the specfile
    List {
        /// List every locked package instead
        #[arg(short, long)]
        all: bool,
    },

    /// Guess which packages the project's imports need
    Guess {
        /// Include packages the specfile already declares
        #[arg(short, long)]
        all: bool,
    },

    /// Print the path of the specfile
    ShowSpecfile,

    /// Print the path of the lockfile
    ShowLockfile,

    /// Print the directory packages are installed into
    ShowPackageDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}
