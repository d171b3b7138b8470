use clap::Parser;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use weatherlink_bridge::config::{self, Config};
use weatherlink_bridge::sensors::{self, SensorState};
use weatherlink_bridge::{
    CoordinatorSettings, CurrentConditions, Result, UpdateCoordinator, UpdateSource,
    WeatherLinkApi, WeatherLinkError, WeatherLinkRest, WeatherSummary,
};

#[derive(Parser)]
#[command(name = "weatherlink-bridge")]
#[command(about = "Mirror the current conditions of a WeatherLink Live or AirLink hub")]
struct Cli {
    /// Hub address, e.g. `weatherlink.local` (overrides WEATHERLINK_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Poll interval in seconds (overrides WEATHERLINK_UPDATE_INTERVAL)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Only poll, even if the hub supports real-time broadcasts
    #[arg(long)]
    no_broadcast: bool,

    /// Print the current conditions as JSON and exit
    #[arg(long)]
    once: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logger();

    // Environment variables must be in place before any runtime thread exists.
    config::load_dotenv();
    let config = Config::from_env();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli, config)) {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let options = config.options()?;
    let host = cli.host.or_else(|| options.host.clone()).ok_or_else(|| {
        WeatherLinkError::InvalidConfig("no host set, use --host or WEATHERLINK_HOST".to_string())
    })?;
    let api = Arc::new(WeatherLinkRest::new(
        config::normalize_host(&host),
        config.request_timeout,
    )?);

    if cli.once {
        let current = api.current_conditions().await?;
        println!("{}", serde_json::to_string_pretty(&current)?);
        return Ok(());
    }

    info!("Starting WeatherLink bridge for {}", api.base_url());

    let mut settings =
        CoordinatorSettings::from_options(&options, config.broadcast && !cli.no_broadcast);
    if let Some(secs) = cli.interval {
        settings.update_interval = Duration::from_secs(secs);
    }

    let coordinator = UpdateCoordinator::initialize(api, settings).await?;
    let units = coordinator.units();
    coordinator.subscribe(move |current: &CurrentConditions, source: UpdateSource| {
        let summary = WeatherSummary::new(&current.conditions);
        match summary.report(&units, false) {
            Some(report) => info!(
                "[{}] {}: {}, {:?} {}, {:?} {}",
                source,
                current.ts,
                report.condition,
                report.temperature,
                report.temperature_unit,
                report.wind_speed,
                report.wind_speed_unit
            ),
            None => info!("[{}] {}", source, current.ts),
        }

        for sensor in sensors::available(&current.conditions) {
            if let Some(SensorState {
                value,
                unit_of_measurement,
            }) = sensor.state(&current.conditions, &units)
            {
                debug!(
                    "  {}: {} {}",
                    sensor.name,
                    value,
                    unit_of_measurement.unwrap_or_default()
                );
            }
        }
    });

    info!(
        "{} '{}' is being mirrored, press Ctrl+C to exit",
        coordinator.device_model_name(),
        coordinator.device_name()
    );

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    coordinator.shutdown().await;
    Ok(())
}
