use std::sync::Arc;

use clap::Parser;
use network_monitoring::{
    config::{read_config_file, Config, DeviceConfig},
    notify::{
        DispatcherHandle, HttpTransport, LogTransport, NotificationDispatcher,
        NotificationTransport,
    },
    repository::{MemoryAlertRepository, MemoryDeviceRepository},
    scheduler::MonitorService,
    util,
};
use tracing::{debug, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Monitoring interval in seconds (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Probe timeout in seconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Run one sweep, print the results and exit
    #[arg(long)]
    single_run: bool,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("network_monitoring", LevelFilter::TRACE),
        ("monitor", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = read_config_file(&args.file)?;
    apply_overrides(&mut config, &args);

    let devices: Vec<_> = config
        .devices
        .take()
        .unwrap_or_default()
        .into_iter()
        .map(DeviceConfig::into_device)
        .collect();
    info!("loaded {} devices from {}", devices.len(), args.file);

    let device_repo = Arc::new(MemoryDeviceRepository::with_devices(devices));
    let alert_repo = Arc::new(MemoryAlertRepository::new());

    let gateway = config.notifications.gateway.clone().or_else(util::get_gateway);
    let transport: Arc<dyn NotificationTransport> = match gateway {
        Some(url) => {
            debug!("notifications will be delivered through {url}");
            Arc::new(HttpTransport::new(url))
        }
        None => {
            debug!("no notification gateway configured, logging only");
            Arc::new(LogTransport)
        }
    };

    let dispatcher = DispatcherHandle::spawn(NotificationDispatcher::new(
        transport,
        alert_repo.clone(),
        config.notifications.recipients.clone(),
        config.notifications.max_attempts,
        config.notifications.backoff_base(),
    ));

    let mut service = MonitorService::new(
        &config.monitor,
        device_repo,
        alert_repo,
        dispatcher.clone(),
    );

    if args.single_run {
        info!("running single monitoring sweep");
        let summary = service.sweep_now().await?;

        for outcome in &summary.outcomes {
            if outcome.changed {
                println!(
                    "  {}: {} -> {}",
                    outcome.name, outcome.old_status, outcome.new_status
                );
            } else {
                println!("  {}: {} (no change)", outcome.name, outcome.new_status);
            }
        }
        println!(
            "Sweep completed. Checked {} devices, {} alerts opened.",
            summary.outcomes.len(),
            summary.alerts_opened()
        );

        dispatcher.drain().await;
        dispatcher.shutdown().await;
        return Ok(());
    }

    service.start();
    info!("press Ctrl+C to stop monitoring");

    tokio::signal::ctrl_c().await?;
    info!("received interrupt signal, stopping");

    service.stop().await;
    dispatcher.shutdown().await;

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(interval) = args.interval.or_else(util::get_interval_override) {
        config.monitor.interval_secs = interval;
    }
    if let Some(timeout) = args.timeout {
        config.monitor.probe_timeout_secs = timeout;
    }
}
