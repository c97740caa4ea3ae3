use clap::{Parser, Subcommand};

/// refguard - guard asset deletions against dangling references
#[derive(Debug, Parser)]
#[command(name = "refguard", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List every document referencing an asset, and whether it is pinned.
    Scan {
        /// Store-relative path of the asset.
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Delete an asset, cleaning up references first if confirmed.
    Delete {
        /// Store-relative path of the asset.
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Start tracking a file and run creation hooks on it.
    Import {
        /// Store-relative path of the file.
        #[arg(value_name = "PATH")]
        path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_subcommand() {
        let cli = Cli::try_parse_from(["refguard", "delete", "Items/gem.template"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Delete {
                path: "Items/gem.template".into()
            }
        );

        let cli = Cli::try_parse_from(["refguard", "scan", "Levels/cave.composite"]).unwrap();
        assert_matches::assert_matches!(cli.command, Command::Scan { .. });
    }

    #[test]
    fn missing_path_and_unknown_command_are_rejected() {
        assert!(Cli::try_parse_from(["refguard"]).is_err());
        assert!(Cli::try_parse_from(["refguard", "delete"]).is_err());
        assert!(Cli::try_parse_from(["refguard", "purge", "x"]).is_err());
    }
}
