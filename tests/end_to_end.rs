//! Restart, resume and cancel flow across the interrupt machine, the
//! scheduler and the control plane.

use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use aura_led_controller::provider::{FixedMarket, FixedSports, FixedWeather};
use aura_led_controller::source::{
    EventSource, SleepSource, SportsSource, StocksSource, SunSource, WeatherSource,
};
use aura_led_controller::{
    listener, Color, CommandBus, ControlState, InterruptController, KeyframeSequence, Scheduler,
    StateStore,
};

fn at(hour: u32, minute: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 8, 5, hour, minute, 0).unwrap()
}

fn sources() -> Vec<Box<dyn EventSource>> {
    let keyframes = KeyframeSequence::build(
        at(6, 0),
        at(20, 0),
        Color::new(255, 10, 0),
        Color::new(255, 255, 255),
        Some(Color::new(40, 0, 80)),
    )
    .unwrap();
    vec![
        Box::new(SunSource::new(keyframes, Color::new(255, 10, 0))),
        Box::new(WeatherSource::new(
            Box::new(FixedWeather(None)),
            chrono::Duration::seconds(900),
        )),
        Box::new(SportsSource::new(&FixedSports::default())),
        Box::new(StocksSource::new(Box::new(FixedMarket(None)))),
        Box::new(SleepSource::new(None)),
    ]
}

async fn send(addr: std::net::SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut stream, request)
        .await
        .unwrap();
    tokio::io::AsyncWriteExt::shutdown(&mut stream).await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    reply
}

#[tokio::test]
async fn movie_survives_a_restart_until_cancelled() {
    // A previous run died mid-movie: its override record is still on disk
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("override.state"));
    store.save(b"m").unwrap();

    let (device, mut device_out) = tokio::io::duplex(4096);
    let bus = Arc::new(CommandBus::new(device));
    let state = ControlState::shared();
    let wake = Arc::new(Notify::new());
    let interrupt = Arc::new(InterruptController::new(
        bus.clone(),
        state.clone(),
        store.clone(),
        wake.clone(),
    ));

    // Startup resume re-enters movie mode with the static settle command,
    // not the animated fade-in
    interrupt.resume().await.unwrap();
    let mut resumed = [0u8; 7];
    device_out.read_exact(&mut resumed).await.unwrap();
    assert_eq!(&resumed, b"01i0011");

    // The scheduler stays silent while the override holds
    let mut scheduler = Scheduler::new(sources(), state.clone(), bus);
    scheduler.tick(at(12, 0)).await;

    let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = control.local_addr().unwrap();
    tokio::spawn(listener::run(control, interrupt, state.clone()));

    assert_eq!(send(addr, b"1").await, b"interrupt");

    // Cancel clears the record and wakes the scheduler
    assert_eq!(send(addr, b"x").await, b"none");
    assert_eq!(store.load().unwrap(), None);
    tokio::time::timeout(std::time::Duration::from_millis(50), wake.notified())
        .await
        .expect("cancel must wake the scheduler");

    // The next cycle hands the light back to the sun; six keyframes have
    // elapsed by noon, which lands mid-ramp on the solar-noon anchor
    scheduler.tick(at(12, 0)).await;
    let mut color = [0u8; 12];
    device_out.read_exact(&mut color).await.unwrap();
    assert_eq!(&color, b":255,255,255");
    assert_eq!(send(addr, b"1").await, b"midday");
}
