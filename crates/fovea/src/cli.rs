use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fovea")]
#[command(version)]
#[command(about = "Attention routing for LLM coding assistants")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process one host hook event: JSON on stdin, JSON on stdout
    Hook,

    /// Show attention and model status for the current project
    Status,

    /// Print version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_subcommands() {
        for name in ["hook", "status", "version"] {
            assert!(Cli::try_parse_from(["fovea", name]).is_ok(), "{}", name);
        }
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["fovea", "frobnicate"]).is_err());
    }
}
