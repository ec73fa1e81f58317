//! fleetmon CLI: operator interface to the fleet monitor.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fleet_monitor::config::{Config, MonitorSettings};
use fleet_monitor::db::Db;
use fleet_monitor::event::EventLog;
use fleet_monitor::monitor::{RunSummary, run_all_monitoring};
use fleet_monitor::services::{CommandMailer, CommandProvisioner, Services, TcpProber};
use fleet_monitor::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use secrecy::ExposeSecret;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fleetmon", about = "Reconcile a CI host fleet")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one monitoring pass and exit
    Run,
    /// Run monitoring passes on a fixed interval until interrupted
    Serve {
        /// Seconds between the end of one pass and the start of the next
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
    /// Print a resource's audit trail, oldest first
    Events {
        /// Host id
        resource_id: String,
    },
    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "fleetmon".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);

    match cli.command {
        Command::Migrate => {
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Command::Events { resource_id } => cmd_events(db, &resource_id).await,
        Command::Run => {
            let (services, settings) = prepare(&config, db).await?;
            let summary = run_all_monitoring(&services, &settings).await?;
            report(&summary);
            Ok(())
        }
        Command::Serve { interval_secs } => {
            let (services, settings) = prepare(&config, db).await?;
            cmd_serve(services, settings, Duration::from_secs(interval_secs), &guard).await
        }
    }
}

async fn prepare(config: &Config, db: Arc<Db>) -> anyhow::Result<(Services, MonitorSettings)> {
    let settings = config.monitor_settings()?;
    db.migrate().await?;
    db.health_check().await?;

    let services = Services::new(
        db.clone(),
        db,
        Arc::new(CommandProvisioner::new(
            &config.provision_command,
            settings.command_timeout(),
        )),
        Arc::new(TcpProber::new(settings.probe_port, settings.probe_timeout())),
        Arc::new(CommandMailer::new(
            &config.notify_command,
            settings.command_timeout(),
        )),
    );
    Ok((services, settings))
}

async fn cmd_serve(
    services: Services,
    settings: MonitorSettings,
    interval: Duration,
    telemetry: &TelemetryGuard,
) -> anyhow::Result<()> {
    info!(
        interval_secs = interval.as_secs(),
        exporting = telemetry.is_exporting(),
        "fleet monitor serving"
    );
    loop {
        // A fatal load failure ends this pass only; the next one retries.
        match run_all_monitoring(&services, &settings).await {
            Ok(summary) => report(&summary),
            Err(e) => error!(error = %e, "monitoring pass failed"),
        }
        telemetry.force_flush();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn cmd_events(db: Arc<Db>, resource_id: &str) -> anyhow::Result<()> {
    let events = EventLog::new(db).find_in_order(resource_id).await?;
    if events.is_empty() {
        println!("No events for {resource_id}.");
        return Ok(());
    }

    println!("{:<6}  {:<27}  {:<26}  DETAILS", "SEQ", "TIMESTAMP", "EVENT");
    println!("{}", "-".repeat(90));
    for event in &events {
        let details = match event.host() {
            Some(host) => {
                let mut parts = Vec::new();
                if let (Some(old), Some(new)) = (host.old_status(), host.new_status()) {
                    parts.push(format!("{old} -> {new}"));
                }
                if let Some(hostname) = host.hostname() {
                    parts.push(format!("hostname={hostname}"));
                }
                if let Some(task_id) = host.task_id() {
                    parts.push(format!("task={task_id}"));
                }
                if let Some(pid) = host.task_pid() {
                    parts.push(format!("pid={pid}"));
                }
                if let Some(log) = host.setup_log() {
                    parts.push(format!("setup_log={} bytes", log.len()));
                }
                parts.join(" ")
            }
            None => String::new(),
        };
        println!(
            "{:<6}  {:<27}  {:<26}  {}",
            event.seq,
            event.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
            event.event_type(),
            details
        );
    }
    println!("\n{} event(s)", events.len());
    Ok(())
}

fn report(summary: &RunSummary) {
    println!(
        "projects: {} (skipped {})  errors: tasks {}, hosts {}, checks {}, notifications {}",
        summary.projects,
        summary.skipped_projects.len(),
        summary.task_errors.len(),
        summary.host_errors.len(),
        summary.check_errors.len(),
        summary.notification_errors.len(),
    );
}
