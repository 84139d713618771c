use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apkforge")]
#[command(author, version, about = "Apply replacement rules to Android packages and rebuild them")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Upload a package and build its decompiled cache
    Import {
        /// APK file to import
        #[arg(required = true)]
        apk: PathBuf,
    },

    /// Run one rule set against an imported package and wait for the result
    Run {
        /// Id printed by `import`
        #[arg(long)]
        apk_id: String,

        /// JSON file holding the rules (an array, or an object with a `rules` array)
        #[arg(long)]
        rules: PathBuf,
    },

    /// Validate a rules file without running it
    ValidateRules {
        /// JSON rules file
        file: PathBuf,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Display version information
    Version,
}
