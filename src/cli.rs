use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "armsync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Reconcile Azure Resource Manager resources with a declarative TOML file", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ./armsync.toml)
    #[arg(short, long, global = true, env = "ARMSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate the configuration and show what apply would change
    Plan(TargetArgs),

    /// Make remote resources match the configuration
    Apply(ApplyArgs),

    /// Delete every resource recorded in state
    Destroy(DestroyArgs),

    /// Bring an existing remote resource under management
    Import {
        /// Address in the configuration, e.g. azurerm_mongo_cluster.primary
        address: String,

        /// Fully qualified resource id
        id: String,
    },

    /// Re-read every recorded resource and update state
    Refresh(TargetArgs),

    /// List supported resource types
    Resources {
        /// Show the fields of one type
        resource_type: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct TargetArgs {
    /// Limit to a resource type or a single address (type.name)
    pub target: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Limit to a resource type or a single address (type.name)
    pub target: Option<String>,

    /// Show what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Number of resources reconciled in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Re-read recorded resources before planning
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Limit to a resource type or a single address (type.name)
    pub target: Option<String>,

    /// Number of resources deleted in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::parse_from(["armsync", "-vv", "apply", "azurerm_quota", "--jobs", "2", "--yes"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.target.as_deref(), Some("azurerm_quota"));
                assert_eq!(args.jobs, 2);
                assert!(args.yes);
                assert!(!args.dry_run);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::parse_from([
            "armsync",
            "--config",
            "infra.toml",
            "import",
            "azurerm_mongo_cluster.primary",
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.DocumentDB/mongoClusters/mc",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("infra.toml")));
        assert!(matches!(cli.command, Command::Import { .. }));
    }
}
