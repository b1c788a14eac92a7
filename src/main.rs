//! `aurad`, the ambient lighting daemon.
//!
//! Opens the command device, gathers the day's data from the configured
//! providers, resumes any persisted override, then runs the scheduler and
//! the control-plane listener until ctrl-c. The daemon is meant to be
//! (re)started each day before sunrise, typically from a cron entry.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use clap::Parser;
use color_eyre::eyre::Result;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use aura_led_controller::provider::{
    CalendarProvider, FileCalendar, FixedMarket, FixedSports, FixedSun, FixedWeather, NoTower,
    SunProvider, TowerProvider,
};
use aura_led_controller::source::{
    CalendarSource, EventSource, SleepSource, SportsSource, StocksSource, SunSource, WeatherSource,
};
use aura_led_controller::{
    listener, Color, CommandBus, ControlState, Error, InterruptController, KeyframeSequence,
    Scheduler, StateStore,
};

/// Dawn anchor of the daylight ramp
const RISE_COLOR: Color = Color::new(255, 10, 0);
/// Solar-noon anchor of the daylight ramp
const MID_COLOR: Color = Color::new(255, 255, 255);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command device that accepts the light controller protocol
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    device: PathBuf,

    /// Control-plane listen address
    #[arg(short, long, default_value = "0.0.0.0:8493")]
    listen: SocketAddr,

    /// Seconds between scheduler cycles
    #[arg(short, long, default_value_t = 300)]
    interval: u64,

    /// Path of the persisted override record
    #[arg(long, default_value = "override.state")]
    state_file: PathBuf,

    /// Holiday calendar file (one `date|name|command|priority` line per day)
    #[arg(long)]
    holidays: Option<PathBuf>,

    /// Minimum seconds between weather re-fetches
    #[arg(long, default_value_t = 900)]
    weather_refresh: u64,

    /// Quiet-hours start (HH:MM); with --sleep-end, enables the dominant
    /// sleep source
    #[arg(long, value_parser = parse_clock)]
    sleep_start: Option<NaiveTime>,

    /// Quiet-hours end (HH:MM)
    #[arg(long, value_parser = parse_clock)]
    sleep_end: Option<NaiveTime>,

    /// Sunrise fallback when no sun feed is wired (HH:MM)
    #[arg(long, value_parser = parse_clock, default_value = "06:00")]
    sunrise: NaiveTime,

    /// Sunset fallback (HH:MM)
    #[arg(long, value_parser = parse_clock, default_value = "20:30")]
    sunset: NaiveTime,
}

fn parse_clock(text: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .map_err(|e| format!("not a HH:MM time: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("aura_led_controller=info,aurad=info")),
        )
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("parsed command line arguments");

    // Hog the device first: nothing works without it
    let device = tokio::fs::OpenOptions::new()
        .write(true)
        .open(&cli.device)
        .await
        .map_err(Error::DeviceUnavailable)?;
    info!(device = %cli.device.display(), "command device opened");
    let bus = Arc::new(CommandBus::new(device));

    // Once-per-day data: sun window and tonight's terminal color
    let sun_times = FixedSun {
        rise: cli.sunrise,
        set: cli.sunset,
    }
    .sun_times()?;
    let set_color = match NoTower.tonight_color() {
        Ok(color) => color,
        Err(e) => {
            warn!(error = %e, "tower feed unavailable, falling back to a dim color");
            None
        }
    };
    let keyframes =
        KeyframeSequence::build(sun_times.rise, sun_times.set, RISE_COLOR, MID_COLOR, set_color)?;
    info!(
        rise = %sun_times.rise.time(),
        set = %sun_times.set.time(),
        keyframes = keyframes.total(),
        "daylight ramp ready"
    );

    let sources = assemble_sources(&cli, keyframes);
    let state = ControlState::shared();
    let wake = Arc::new(Notify::new());
    let interrupt = Arc::new(InterruptController::new(
        bus.clone(),
        state.clone(),
        StateStore::new(&cli.state_file),
        wake.clone(),
    ));

    // Re-enter a persisted override before the first cycle can run
    interrupt.resume().await?;

    let control = TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, "control plane bound");

    let scheduler = Scheduler::new(sources, state.clone(), bus);
    let scheduler_task = tokio::spawn(scheduler.run(Duration::from_secs(cli.interval), wake));
    let listener_task = tokio::spawn(listener::run(control, interrupt, state));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler_task.abort();
    listener_task.abort();

    Ok(())
}

/// Builds the handler list in its load-bearing order: the first entry is
/// the baseline source and earlier entries win priority ties.
fn assemble_sources(cli: &Cli, keyframes: KeyframeSequence) -> Vec<Box<dyn EventSource>> {
    let calendar: CalendarSource = match &cli.holidays {
        Some(path) => CalendarSource::new(&FileCalendar { path: path.clone() }),
        None => {
            struct NoCalendar;
            impl CalendarProvider for NoCalendar {
                fn todays_event(
                    &self,
                ) -> aura_led_controller::Result<Option<aura_led_controller::provider::HolidayEvent>>
                {
                    Ok(None)
                }
            }
            CalendarSource::new(&NoCalendar)
        }
    };

    let sleep_window = match (cli.sleep_start, cli.sleep_end) {
        (Some(start), Some(end)) => Some((start, end)),
        (None, None) => None,
        _ => {
            warn!("--sleep-start and --sleep-end must both be given; sleep source disabled");
            None
        }
    };

    vec![
        Box::new(SunSource::new(keyframes, RISE_COLOR)),
        Box::new(WeatherSource::new(
            Box::new(FixedWeather(None)),
            chrono::Duration::seconds(cli.weather_refresh as i64),
        )),
        Box::new(calendar),
        Box::new(SportsSource::new(&FixedSports::default())),
        Box::new(StocksSource::new(Box::new(FixedMarket(None)))),
        Box::new(SleepSource::new(sleep_window)),
    ]
}
