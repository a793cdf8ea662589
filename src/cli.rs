use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "repo-scribe")]
#[command(about = "LLM-backed codebase analysis and README drafting", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable debug logging and request diagnostics
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a project and persist the resulting artifacts
    Analyze {
        /// Path to the project root
        path: PathBuf,

        /// Model to use (see `models` for the catalog)
        #[arg(short, long)]
        model: Option<String>,

        /// Stream long-form responses to stdout as they arrive
        #[arg(long)]
        stream: bool,

        /// Extra ignore pattern, in gitignore syntax (repeatable)
        #[arg(short, long = "ignore", value_name = "PATTERN")]
        ignore: Vec<String>,

        /// Describe the reader so explanations match their background
        #[arg(long)]
        expertise: Option<String>,
    },

    /// List every model the configured providers can serve
    Models,

    /// Draft a README from a previous analysis run
    Readme {
        /// Path to the analyzed project root
        path: PathBuf,

        /// Model to use (see `models` for the catalog)
        #[arg(short, long)]
        model: Option<String>,

        /// Stream the draft to stdout as it arrives
        #[arg(long)]
        stream: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_arguments_parse() {
        let cli = Cli::try_parse_from([
            "repo-scribe",
            "analyze",
            "/tmp/project",
            "--model",
            "gpt-4o",
            "--stream",
            "--ignore",
            "dist",
            "--ignore",
            "*.min.js",
            "--expertise",
            "junior backend developer",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                path,
                model,
                stream,
                ignore,
                expertise,
            } => {
                assert_eq!(path, PathBuf::from("/tmp/project"));
                assert_eq!(model.as_deref(), Some("gpt-4o"));
                assert!(stream);
                assert_eq!(ignore, vec!["dist", "*.min.js"]);
                assert_eq!(expertise.as_deref(), Some("junior backend developer"));
            }
            other => panic!("expected analyze, got {other:?}"),
        }
    }

    #[test]
    fn test_verbose_flag_is_global() {
        let cli = Cli::try_parse_from(["repo-scribe", "models", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Models));
    }

    #[test]
    fn test_readme_needs_only_a_path() {
        let cli = Cli::try_parse_from(["repo-scribe", "readme", "."]).unwrap();
        match cli.command {
            Commands::Readme {
                path,
                model,
                stream,
            } => {
                assert_eq!(path, PathBuf::from("."));
                assert_eq!(model, None);
                assert!(!stream);
            }
            other => panic!("expected readme, got {other:?}"),
        }
    }
}
