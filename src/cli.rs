use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "veritech")]
#[command(version)]
#[command(about = "Reconcile modeled infrastructure entities with the real world", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print reports as JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Graph snapshot file (entities and edges as JSON)
    #[arg(long, global = true, env = "VERITECH_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Parallel workers per topological layer
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Command timeout in seconds (0 disables the timeout)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate the snapshot and show its topological layers
    Graph,

    /// Run property inference over every entity
    Infer {
        /// Write inferred properties back to the snapshot
        #[arg(long)]
        write: bool,
    },

    /// Synchronize entities with their real-world resources
    Sync {
        /// Sync only this entity
        #[arg(short, long)]
        entity: Option<String>,

        /// Skip the inference pass that normally runs first
        #[arg(long)]
        no_infer: bool,

        /// Write resulting resources back to the snapshot
        #[arg(long)]
        write: bool,
    },

    /// Dispatch a named action and its cascades
    Action {
        /// Action name (e.g. deploy)
        name: String,

        /// Entity the action is dispatched on
        #[arg(short, long)]
        entity: String,

        /// JSON object handed to every action of the dispatch
        #[arg(long, value_name = "JSON")]
        context: Option<String>,

        /// Write resulting resources back to the snapshot
        #[arg(long)]
        write: bool,
    },

    /// Check the environment: config, snapshot and required tools
    Doctor,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync_with_global_flags() {
        let cli = Cli::try_parse_from([
            "veritech",
            "-vv",
            "--json",
            "sync",
            "--entity",
            "img-1",
            "--no-infer",
            "--snapshot",
            "/tmp/graph.json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        assert_eq!(cli.snapshot, Some(PathBuf::from("/tmp/graph.json")));
        match cli.command {
            Command::Sync {
                entity,
                no_infer,
                write,
            } => {
                assert_eq!(entity.as_deref(), Some("img-1"));
                assert!(no_infer);
                assert!(!write);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_action_requires_entity() {
        assert!(Cli::try_parse_from(["veritech", "action", "deploy"]).is_err());
        let cli =
            Cli::try_parse_from(["veritech", "action", "deploy", "-e", "svc", "--write"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Action { ref name, ref entity, context: None, write: true }
                if name == "deploy" && entity == "svc"
        ));
    }

    #[test]
    fn test_action_context() {
        let cli = Cli::try_parse_from([
            "veritech",
            "action",
            "deploy",
            "-e",
            "svc",
            "--context",
            r#"{"ticket":"OPS-7"}"#,
        ])
        .unwrap();
        match cli.command {
            Command::Action { context, .. } => {
                assert_eq!(context.as_deref(), Some(r#"{"ticket":"OPS-7"}"#));
            }
            _ => panic!("expected action"),
        }
    }
}
