//! CyberGuard Console - terminal front-end for the realtime sync client
//!
//! Default mode keeps the dashboard state in sync and logs a summary line
//! every few seconds. One-shot subcommands send a single backend action:
//!
//! ```text
//! cyberguard-console [watch]
//! cyberguard-console status | refresh | metrics | metrics-csv | health
//! cyberguard-console quarantine <node> | release <node> | redistribute <node>
//! cyberguard-console attack <node> <kind>
//! cyberguard-console threat [node] [severity]
//! cyberguard-console demo-ddos [node] | demo-reset
//! ```

use anyhow::{anyhow, bail, Context, Result};
use cyberguard_sync::{SyncClient, SyncConfig, ThreatOptions};
use cyberguard_sync::models::Severity;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Watch,
    Status,
    Refresh,
    Quarantine(String),
    Release(String),
    Attack { node_id: String, kind: String },
    Threat { node_id: Option<String>, severity: Severity },
    Redistribute(String),
    DemoDdos(Option<String>),
    DemoReset,
    Metrics,
    MetricsCsv,
    Health,
}

fn parse_severity(value: &str) -> Result<Severity> {
    match value.to_ascii_lowercase().as_str() {
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        "critical" => Ok(Severity::Critical),
        other => Err(anyhow!("unknown severity '{other}'")),
    }
}

fn next_node<'a>(it: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<String> {
    it.next()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{what} requires a node id"))
}

fn parse_args(args: &[String]) -> Result<Command> {
    let mut it = args.iter().map(String::as_str);
    let command = it.next().unwrap_or("watch");

    let parsed = match command {
        "watch" => Command::Watch,
        "status" => Command::Status,
        "refresh" => Command::Refresh,
        "metrics" => Command::Metrics,
        "metrics-csv" => Command::MetricsCsv,
        "health" => Command::Health,
        "demo-reset" => Command::DemoReset,
        "quarantine" => Command::Quarantine(next_node(&mut it, "quarantine")?),
        "release" => Command::Release(next_node(&mut it, "release")?),
        "redistribute" => Command::Redistribute(next_node(&mut it, "redistribute")?),
        "attack" => {
            let node_id = next_node(&mut it, "attack")?;
            let kind = it.next().ok_or_else(|| anyhow!("attack requires a kind"))?.to_string();
            Command::Attack { node_id, kind }
        }
        "threat" => {
            let node_id = it.next().filter(|n| *n != "random").map(str::to_string);
            let severity = it.next().map(parse_severity).transpose()?.unwrap_or(Severity::Medium);
            Command::Threat { node_id, severity }
        }
        "demo-ddos" => Command::DemoDdos(it.next().map(str::to_string)),
        other => bail!("unknown command '{other}'"),
    };
    Ok(parsed)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn watch(client: &SyncClient) -> Result<()> {
    client.start().await;

    let signals = client.signals().clone();
    let mut connection = signals.watch_connection();
    let mut load_error = signals.watch_load_error();
    let mut alerts = signals.watch_alert();
    let mut summary = tokio::time::interval(SUMMARY_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            Ok(()) = connection.changed() => {
                info!("Push channel: {:?}", *connection.borrow_and_update());
            }
            Ok(()) = load_error.changed() => {
                if let Some(error) = load_error.borrow_and_update().clone() {
                    warn!("{}", error);
                }
            }
            Ok(()) = alerts.changed() => {
                if let Some(alert) = alerts.borrow_and_update().clone() {
                    warn!("\x07{} event {} on {}", alert.severity.as_str(), alert.event_id, alert.node_id);
                }
            }
            _ = summary.tick() => {
                let snapshot = client.snapshot();
                let attacked = snapshot
                    .nodes
                    .iter()
                    .filter(|n| n.health != cyberguard_sync::NodeHealth::Healthy)
                    .count();
                let cpu = snapshot.cluster.cpu.last().copied().unwrap_or_default();
                info!(
                    "{:?} | {} nodes ({} not healthy) | cluster cpu {}% | {} events | {} decisions",
                    snapshot.connection,
                    snapshot.nodes.len(),
                    attacked,
                    cpu,
                    snapshot.events.len(),
                    snapshot.decisions.len()
                );
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

async fn run(client: &SyncClient, command: Command) -> Result<()> {
    match command {
        Command::Watch => watch(client).await?,
        Command::Status => {
            let report = client.refresh().await;
            if !report.is_complete() {
                warn!("Partial refresh: nodes ok={} events ok={}", report.nodes_ok, report.events_ok);
            }
            print_json(&client.snapshot())?;
        }
        Command::Refresh => {
            let report = client.refresh().await;
            println!(
                "nodes written {} / kept {} | events written {}",
                report.outcome.nodes_written, report.outcome.nodes_kept, report.outcome.events_written
            );
        }
        Command::Quarantine(node_id) => print_json(&client.quarantine(&node_id).await.context("quarantine failed")?)?,
        Command::Release(node_id) => print_json(&client.release(&node_id).await.context("release failed")?)?,
        Command::Redistribute(node_id) => {
            print_json(&client.redistribute(&node_id).await.context("redistribute failed")?)?
        }
        Command::Attack { node_id, kind } => {
            print_json(&client.attack(&node_id, &kind).await.context("attack failed")?)?
        }
        Command::Threat { node_id, severity } => {
            let options = ThreatOptions {
                node_id,
                severity,
                ..Default::default()
            };
            print_json(&client.simulate_threat(options).await.context("threat simulation failed")?)?
        }
        Command::DemoDdos(target) => {
            client.refresh().await;
            print_json(&client.demo_ddos(target).await.context("DDoS demo failed to start")?)?;
        }
        Command::DemoReset => {
            client.demo_reset().await.context("demo reset failed")?;
            println!("demo reset");
        }
        Command::Metrics => print_json(&client.load_metrics().await.context("metrics request failed")?)?,
        Command::MetricsCsv => print!("{}", client.metrics_csv().await.context("metrics export failed")?),
        Command::Health => {
            let health = client.backend_health().await.context("health request failed")?;
            print_json(&health)?;
            if !health.is_ok() {
                bail!("backend reports status '{}'", health.status);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cyberguard_console=info,cyberguard_sync=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let config = SyncConfig::load().context("Failed to load configuration")?;
    info!("CyberGuard console -> {} / {}", config.http_url, config.ws_endpoint());
    let client = SyncClient::new(config).context("Failed to create sync client")?;

    run(&client, command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_is_watch() {
        assert_eq!(parse_args(&[]).unwrap(), Command::Watch);
    }

    #[test]
    fn test_node_commands() {
        assert_eq!(parse_args(&args(&["quarantine", "n1"])).unwrap(), Command::Quarantine("n1".into()));
        assert_eq!(
            parse_args(&args(&["attack", "n2", "ddos"])).unwrap(),
            Command::Attack { node_id: "n2".into(), kind: "ddos".into() }
        );
        assert!(parse_args(&args(&["release"])).is_err());
        assert!(parse_args(&args(&["attack", "n2"])).is_err());
    }

    #[test]
    fn test_threat_defaults() {
        assert_eq!(
            parse_args(&args(&["threat"])).unwrap(),
            Command::Threat { node_id: None, severity: Severity::Medium }
        );
        assert_eq!(
            parse_args(&args(&["threat", "random", "critical"])).unwrap(),
            Command::Threat { node_id: None, severity: Severity::Critical }
        );
        assert!(parse_args(&args(&["threat", "n1", "apocalyptic"])).is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse_args(&args(&["launch"])).is_err());
        assert_eq!(parse_args(&args(&["demo-ddos"])).unwrap(), Command::DemoDdos(None));
    }
}
