use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shiftbox")]
#[command(about = "ShiftBox cross-project data migration", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides SHIFTBOX_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Server(ServerArgs),
    /// Run a single migration job to completion and print its result
    Migrate(MigrateArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct MigrateArgs {
    /// Job description in TOML. Credentials left out are taken from the
    /// SHIFTBOX_SOURCE_* / SHIFTBOX_TARGET_* environment variables.
    #[arg(long)]
    pub job: PathBuf,

    /// Print the result as compact JSON on one line
    #[arg(long)]
    pub compact: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate() {
        let cli = Cli::parse_from(["shiftbox", "migrate", "--job", "jobs/accounts.toml"]);
        match cli.command {
            Commands::Migrate(args) => {
                assert_eq!(args.job, PathBuf::from("jobs/accounts.toml"));
                assert!(!args.compact);
            }
            other => panic!("Expected migrate, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_server_with_global_config() {
        let cli = Cli::parse_from([
            "shiftbox",
            "server",
            "--address",
            "127.0.0.1:9000",
            "--config",
            "custom.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Server(args) => {
                assert_eq!(args.address.unwrap().to_string(), "127.0.0.1:9000")
            }
            other => panic!("Expected server, got {other:?}"),
        }
    }
}
