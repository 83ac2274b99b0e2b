// JDWP probe - attach to a JVM and report what it exposes
//
// Prints a JSON summary on stdout; diagnostics go to stderr

use anyhow::{Context, Result};
use clap::Parser;
use jdwp_client::{ClassData, IdSizes, JdwpConfig, JdwpConnection, VmVersion};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "jdwp-probe", version, about = "Attach to a JVM over JDWP and describe it")]
struct Cli {
    /// Host the debuggee listens on
    #[arg(long, default_value = "localhost", env = "JDWP_HOST")]
    host: String,

    /// JDWP port (agentlib:jdwp=...,address=<port>)
    #[arg(long, env = "JDWP_PORT")]
    port: u16,

    #[arg(long, value_name = "MS", default_value_t = 10_000)]
    connect_timeout_ms: u64,

    /// Budget for Dispose on detach
    #[arg(long, value_name = "MS", default_value_t = 5_000)]
    teardown_timeout_ms: u64,

    /// Number of classes to include in the report
    #[arg(long, default_value_t = 20)]
    max_classes: usize,

    /// Resume all threads after attaching (for suspend=y debuggees)
    #[arg(long)]
    resume: bool,
}

impl Cli {
    fn config(&self) -> JdwpConfig {
        JdwpConfig {
            connect_timeout: Some(Duration::from_millis(self.connect_timeout_ms)),
            teardown_timeout: Duration::from_millis(self.teardown_timeout_ms),
            ..JdwpConfig::default()
        }
    }
}

#[derive(Serialize, Debug)]
struct ProbeReport {
    version: VmVersion,
    id_sizes: IdSizes,
    class_count: usize,
    classes: Vec<ClassData>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("jdwp_probe=info,jdwp_client=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Attaching to {}:{}", cli.host, cli.port);

    let mut connection = JdwpConnection::connect_with_config(&cli.host, cli.port, cli.config())
        .await
        .with_context(|| format!("failed to attach to {}:{}", cli.host, cli.port))?;

    let report = probe(&mut connection, &cli).await;
    connection.close().await;

    let report = report?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn probe(connection: &mut JdwpConnection, cli: &Cli) -> Result<ProbeReport> {
    connection
        .initialize()
        .await
        .context("JDWP initialization failed")?;

    if cli.resume {
        connection.resume().await.context("VirtualMachine.Resume failed")?;
        info!("Resumed all threads");
    }

    Ok(build_report(
        connection.version().cloned().unwrap_or_default(),
        connection.engine().id_sizes(),
        connection.classes(),
        cli.max_classes,
    ))
}

fn build_report(
    version: VmVersion,
    id_sizes: IdSizes,
    classes: &[ClassData],
    max_classes: usize,
) -> ProbeReport {
    ProbeReport {
        version,
        id_sizes,
        class_count: classes.len(),
        classes: classes.iter().take(max_classes).cloned().collect(),
    }
}
