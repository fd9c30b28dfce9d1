//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::domain::VesselAttribute;

/// Grow vascular trees by constrained constructive optimization
#[derive(Parser, Debug)]
#[command(name = "ccogrow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global one
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Grow a tree
    Grow {
        /// Terminal target (single-stage runs only)
        #[arg(short, long)]
        terminals: Option<usize>,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Write a TOML snapshot of the tree
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,

        /// Print the vessel hierarchy
        #[arg(long)]
        show_tree: bool,

        /// Print mean, median and standard deviation of an attribute
        #[arg(long, value_parser = parse_attribute)]
        stats: Vec<VesselAttribute>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Print a commented config template
    Template,

    /// Show config paths
    Path,
}

fn parse_attribute(s: &str) -> Result<VesselAttribute, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn given_grow_args_when_parsing_then_fields_set() {
        let cli = Cli::try_parse_from([
            "ccogrow", "-dd", "grow", "--terminals", "30", "--seed", "7", "--stats", "radius", "--stats", "length",
        ])
        .unwrap();
        assert_eq!(cli.debug, 2);
        match cli.command {
            Some(Commands::Grow {
                terminals,
                seed,
                stats,
                ..
            }) => {
                assert_eq!(terminals, Some(30));
                assert_eq!(seed, Some(7));
                assert_eq!(stats, vec![VesselAttribute::Radius, VesselAttribute::Length]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn given_unknown_attribute_when_parsing_then_rejected() {
        assert!(Cli::try_parse_from(["ccogrow", "grow", "--stats", "girth"]).is_err());
    }
}
