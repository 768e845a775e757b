// ABOUTME: CLI entry point for table-mirror
// ABOUTME: Parses arguments, materializes the config, and routes to commands

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use table_mirror::commands;
use table_mirror::config::{EndpointConfig, MirrorConfig, RetryPolicy};

#[derive(Parser)]
#[command(name = "table-mirror")]
#[command(about = "Mirror one MySQL table into another with audit tracking columns", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct MirrorArgs {
    /// Source database host
    #[arg(long, env = "SOURCE_DB_HOST")]
    source_host: Option<String>,
    /// Source database port
    #[arg(long, env = "SOURCE_DB_PORT", default_value_t = 3306)]
    source_port: u16,
    /// Source database user
    #[arg(long, env = "SOURCE_DB_USER")]
    source_user: Option<String>,
    /// Source database password
    #[arg(long, env = "SOURCE_DB_PASSWORD", hide_env_values = true)]
    source_password: Option<String>,
    /// Source database name
    #[arg(long, env = "SOURCE_DB_NAME")]
    source_database: Option<String>,
    /// Target database host
    #[arg(long, env = "TARGET_DB_HOST")]
    target_host: Option<String>,
    /// Target database port
    #[arg(long, env = "TARGET_DB_PORT", default_value_t = 3306)]
    target_port: u16,
    /// Target database user
    #[arg(long, env = "TARGET_DB_USER")]
    target_user: Option<String>,
    /// Target database password (may be empty, but must be set)
    #[arg(long, env = "TARGET_DB_PASSWORD", hide_env_values = true)]
    target_password: Option<String>,
    /// Target database name
    #[arg(long, env = "TARGET_DB_NAME")]
    target_database: Option<String>,
    /// Table to mirror (same name on both sides)
    #[arg(long, env = "TABLE_NAME")]
    table: Option<String>,
    /// Rows per write batch
    #[arg(long, default_value_t = 500)]
    batch_size: usize,
    /// Timeout for a single connect attempt, in seconds
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,
    /// Connection attempts before giving up
    #[arg(long, default_value_t = 3)]
    connect_attempts: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one mirror pass: snapshot both tables, diff, and apply
    Sync {
        #[command(flatten)]
        args: MirrorArgs,
        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Check that source and target are ready for mirroring (read-only)
    Validate {
        #[command(flatten)]
        args: MirrorArgs,
    },
}

/// Materialize the run configuration from CLI arguments and their
/// environment fallbacks, listing every missing parameter at once.
fn build_config(args: MirrorArgs) -> Result<MirrorConfig> {
    fn require(
        missing: &mut Vec<&'static str>,
        value: Option<String>,
        name: &'static str,
    ) -> String {
        match value {
            Some(v) if !v.is_empty() => v,
            _ => {
                missing.push(name);
                String::new()
            }
        }
    }

    let mut missing: Vec<&'static str> = Vec::new();

    let source = EndpointConfig {
        host: require(&mut missing, args.source_host, "SOURCE_DB_HOST (--source-host)"),
        port: args.source_port,
        user: require(&mut missing, args.source_user, "SOURCE_DB_USER (--source-user)"),
        password: require(
            &mut missing,
            args.source_password,
            "SOURCE_DB_PASSWORD (--source-password)",
        ),
        database: require(
            &mut missing,
            args.source_database,
            "SOURCE_DB_NAME (--source-database)",
        ),
    };
    // The target password may be empty, but it must be explicitly set
    let target_password = match args.target_password {
        Some(v) => v,
        None => {
            missing.push("TARGET_DB_PASSWORD (--target-password)");
            String::new()
        }
    };
    let target = EndpointConfig {
        host: require(&mut missing, args.target_host, "TARGET_DB_HOST (--target-host)"),
        port: args.target_port,
        user: require(&mut missing, args.target_user, "TARGET_DB_USER (--target-user)"),
        password: target_password,
        database: require(
            &mut missing,
            args.target_database,
            "TARGET_DB_NAME (--target-database)",
        ),
    };
    let table = require(&mut missing, args.table, "TABLE_NAME (--table)");

    if !missing.is_empty() {
        bail!(
            "Missing required connection parameters: {}",
            missing.join(", ")
        );
    }

    Ok(MirrorConfig {
        source,
        target,
        table,
        batch_size: args.batch_size,
        connect_timeout: Duration::from_secs(args.connect_timeout),
        retry: RetryPolicy {
            max_attempts: args.connect_attempts,
            ..RetryPolicy::default()
        },
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Sync { args, json } => {
            let config = build_config(args)?;
            commands::sync(config, json).await
        }
        Commands::Validate { args } => {
            let config = build_config(args)?;
            commands::validate(config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_args() -> MirrorArgs {
        MirrorArgs {
            source_host: Some("src".to_string()),
            source_port: 3306,
            source_user: Some("u".to_string()),
            source_password: Some("p".to_string()),
            source_database: Some("db".to_string()),
            target_host: Some("tgt".to_string()),
            target_port: 3307,
            target_user: Some("u2".to_string()),
            target_password: Some(String::new()),
            target_database: Some("db2".to_string()),
            table: Some("orders".to_string()),
            batch_size: 500,
            connect_timeout: 10,
            connect_attempts: 3,
        }
    }

    #[test]
    fn test_build_config_accepts_empty_target_password() {
        let config = build_config(full_args()).unwrap();
        assert_eq!(config.target.password, "");
        assert_eq!(config.target.port, 3307);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_config_requires_target_password_to_be_set() {
        let mut args = full_args();
        args.target_password = None;
        let err = build_config(args).unwrap_err().to_string();
        assert!(err.contains("TARGET_DB_PASSWORD"));
    }

    #[test]
    fn test_build_config_lists_all_missing_parameters() {
        let mut args = full_args();
        args.source_host = None;
        args.table = Some(String::new());
        let err = build_config(args).unwrap_err().to_string();
        assert!(err.contains("SOURCE_DB_HOST"));
        assert!(err.contains("TABLE_NAME"));
    }
}
