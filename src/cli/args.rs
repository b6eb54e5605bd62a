use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "recapd",
    about = "Meeting audio to searchable, speaker-attributed, AI-summarized minutes"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Print the version
    Version,
    /// Run one retention sweep pass and exit
    Sweep,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_args_runs_service() {
        let cli = Cli::parse_from(["recapd"]);
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_sweep_subcommand() {
        let cli = Cli::parse_from(["recapd", "sweep"]);
        assert!(matches!(cli.command, Some(CliCommand::Sweep)));
    }

    #[test]
    fn test_verbose_flag() {
        let cli = Cli::parse_from(["recapd", "-v", "version"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(CliCommand::Version)));
    }
}
