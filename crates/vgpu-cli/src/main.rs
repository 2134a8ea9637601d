//! vgpu-admit CLI
//!
//! Runs GPU admission decisions against node and workload snapshots on disk.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use vgpu_core::AdmissionConfig;

/// vgpu-admit - pick GPU devices for workloads on a node
#[derive(Parser, Debug)]
#[command(name = "vgpu-admit")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overrides the configuration file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a workload fits on a node
    Predicate {
        /// Node snapshot (JSON)
        #[arg(long)]
        node: PathBuf,

        /// Workload descriptor (JSON)
        #[arg(long)]
        workload: PathBuf,

        /// Write the node back after the check
        #[arg(long)]
        write_node: bool,
    },

    /// Allocate devices and print the annotated workload
    Allocate {
        /// Node snapshot (JSON)
        #[arg(long)]
        node: PathBuf,

        /// Workload descriptor (JSON)
        #[arg(long)]
        workload: PathBuf,

        /// Write the updated node back
        #[arg(long)]
        write_node: bool,
    },

    /// Return the devices booked for an allocated workload
    Release {
        /// Node snapshot (JSON), updated in place
        #[arg(long)]
        node: PathBuf,

        /// Workload annotated by `allocate` (JSON)
        #[arg(long)]
        workload: PathBuf,
    },

    /// Show share mode scores for a request
    Rank {
        /// Node snapshot (JSON)
        #[arg(long)]
        node: PathBuf,

        /// Requested virtual cores
        #[arg(long)]
        cores: u64,

        /// Requested virtual memory
        #[arg(long, default_value_t = 0)]
        memory: u64,

        /// Estimated execution time
        #[arg(long, default_value_t = 0)]
        estimated_time: u64,
    },
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn init_logging(config: &AdmissionConfig, override_level: Option<&str>) -> anyhow::Result<()> {
    let level = parse_level(override_level.unwrap_or(&config.logging.level));
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = if config.logging.format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.context("Failed to set subscriber")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AdmissionConfig::from_file(path)?,
        None => AdmissionConfig::default(),
    };
    init_logging(&config, cli.log_level.as_deref())?;

    match cli.command {
        Commands::Predicate {
            node,
            workload,
            write_node,
        } => {
            commands::predicate(&config, &node, &workload, write_node)?;
        }
        Commands::Allocate {
            node,
            workload,
            write_node,
        } => {
            commands::allocate(&config, &node, &workload, write_node)?;
        }
        Commands::Release { node, workload } => {
            commands::release(&node, &workload)?;
        }
        Commands::Rank {
            node,
            cores,
            memory,
            estimated_time,
        } => {
            commands::rank(&config, &node, cores, memory, estimated_time)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_cli_parses_allocate() {
        let cli = Cli::parse_from([
            "vgpu-admit",
            "--log-level",
            "debug",
            "allocate",
            "--node",
            "node.json",
            "--workload",
            "pod.json",
            "--write-node",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Allocate { write_node, .. } => assert!(write_node),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_init_logging_twice_fails() {
        let config = AdmissionConfig::default();
        assert!(init_logging(&config, Some("warn")).is_ok());
        let err = init_logging(&config, None).unwrap_err();
        assert!(err.to_string().contains("Failed to set subscriber"));
    }
}
