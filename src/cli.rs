//! Command-line interface for the voicetriage binary.

use std::path::PathBuf;

use clap::Parser;

/// Voice triage conversation in the terminal
#[derive(Parser, Debug)]
#[command(name = "voicetriage", version, about = "Voice triage conversation in the terminal")]
pub struct Cli {
    /// Submit stdin lines as typed text instead of console speech capture
    #[arg(long)]
    pub text: bool,

    /// Path to a JSON configuration file
    #[arg(value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_voice_mode_without_config() {
        let cli = Cli::try_parse_from(["voicetriage"]).expect("parses");
        assert!(!cli.text);
        assert!(cli.config.is_none());
    }

    #[test]
    fn accepts_text_flag_and_config_path() {
        let cli = Cli::try_parse_from(["voicetriage", "--text", "triage.json"]).expect("parses");
        assert!(cli.text);
        assert_eq!(cli.config, Some(PathBuf::from("triage.json")));
    }

    #[test]
    fn unknown_flags_are_rejected_instead_of_read_as_paths() {
        let err = Cli::try_parse_from(["voicetriage", "--txt"]).expect_err("unknown flag");
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);

        let help = Cli::try_parse_from(["voicetriage", "--help"]).expect_err("help exits");
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
