/*!
 # Priority scheduler

 Once per cycle: refresh every source's dynamic priority, pick the winner
 from the priority table, dispatch exactly that one handler and put its
 command on the bus. The whole cycle is skipped while an operator override
 holds the light; the flag check is the first thing a tick does.
*/

use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info, trace, warn};

use crate::bus::CommandBus;
use crate::source::{priority, EventSource};

/// State shared between the scheduler, the interrupt machine and the
/// listener: whether an override is active, and which event last drove the
/// device. The label is owned by whoever dispatched last and is always
/// overwritten whole.
#[derive(Debug)]
pub struct ControlState {
    pub interrupt_active: bool,
    pub current_event: &'static str,
}

pub type SharedState = Arc<Mutex<ControlState>>;

impl ControlState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(ControlState {
            interrupt_active: false,
            current_event: "none",
        }))
    }
}

/// One integer priority per source, in fixed declaration order.
#[derive(Debug, Clone)]
pub struct PriorityTable {
    entries: Vec<(&'static str, i8)>,
}

impl PriorityTable {
    pub fn new(names: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            entries: names
                .into_iter()
                .map(|name| (name, priority::DISABLED))
                .collect(),
        }
    }

    /// Overwrites one source's priority in place, clamped into [-1, 6].
    pub fn set(&mut self, index: usize, value: i8) {
        self.entries[index].1 = value.clamp(priority::DISABLED, priority::DOMINANT);
    }

    pub fn get(&self, name: &str) -> Option<i8> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| *p)
    }

    /// Selects the source to dispatch. Deterministic by construction:
    /// strictly greater priority wins, ties go to the first-declared
    /// source, disabled (-1) entries are never selected. When every entry
    /// is disabled the first-declared source is returned; that slot is the
    /// baseline source, which always exists.
    pub fn winner(&self) -> usize {
        let mut best = 0;
        let mut best_priority = priority::DISABLED;
        for (index, (_, p)) in self.entries.iter().enumerate() {
            if *p > best_priority {
                best = index;
                best_priority = *p;
            }
        }
        best
    }

    pub fn snapshot(&self) -> &[(&'static str, i8)] {
        &self.entries
    }
}

/// The decision engine: owns the sources and their priority table.
pub struct Scheduler {
    sources: Vec<Box<dyn EventSource>>,
    table: PriorityTable,
    state: SharedState,
    bus: Arc<CommandBus>,
    last_winner: Option<&'static str>,
}

impl Scheduler {
    /// The order of `sources` is load-bearing: it is the tie-break order,
    /// and the first source must be the always-on baseline.
    pub fn new(sources: Vec<Box<dyn EventSource>>, state: SharedState, bus: Arc<CommandBus>) -> Self {
        let table = PriorityTable::new(sources.iter().map(|s| s.name()));
        Self {
            sources,
            table,
            state,
            bus,
            last_winner: None,
        }
    }

    /// Runs one evaluation cycle, unless an override is active.
    pub async fn tick(&mut self, now: DateTime<Local>) {
        {
            let state = self.state.lock();
            if state.interrupt_active {
                trace!("override active, skipping cycle");
                return;
            }
        }

        debug!("choosing next event");
        for (index, source) in self.sources.iter_mut().enumerate() {
            source.refresh(now);
            self.table.set(index, source.priority());
        }
        trace!(table = ?self.table.snapshot(), "priorities refreshed");

        let index = self.table.winner();
        let source = &mut self.sources[index];
        let name = source.name();
        let repeat = self.last_winner == Some(name);

        match source.dispatch(now, repeat) {
            Ok(dispatch) => {
                if let Some(command) = dispatch.command {
                    if let Err(e) = self.bus.send(&command).await {
                        error!(source = name, error = %e, "device write failed");
                        return;
                    }
                }
                self.last_winner = Some(name);
                self.state.lock().current_event = dispatch.label;
                debug!(source = name, label = dispatch.label, "event dispatched");
            }
            Err(e) => {
                // one bad handler never kills the cycle loop
                warn!(source = name, error = %e, "dispatch failed, cycle dropped");
            }
        }
    }

    /// Drives ticks forever: one per interval, plus an eager one whenever
    /// `wake` is signalled (an override was just cancelled and the light
    /// should not wait out the timer).
    pub async fn run(mut self, interval: std::time::Duration, wake: Arc<Notify>) {
        info!(interval_secs = interval.as_secs(), "scheduler running");
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wake.notified() => {
                    debug!("eager re-evaluation requested");
                }
            }
            self.tick(Local::now()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::keyframe::KeyframeSequence;
    use crate::provider::{FixedMarket, FixedSports, FixedWeather};
    use crate::source::{
        CalendarSource, SleepSource, SportsSource, StocksSource, SunSource, WeatherSource,
    };
    use chrono::TimeZone;
    use tokio::io::AsyncReadExt;

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 5, hour, minute, 0).unwrap()
    }

    fn sun_source() -> SunSource {
        let keyframes = KeyframeSequence::build(
            at(6, 0),
            at(20, 0),
            Color::new(255, 10, 0),
            Color::new(255, 255, 255),
            Some(Color::new(40, 0, 80)),
        )
        .unwrap();
        SunSource::new(keyframes, Color::new(255, 10, 0))
    }

    struct NullCalendar;
    impl crate::provider::CalendarProvider for NullCalendar {
        fn todays_event(&self) -> crate::Result<Option<crate::provider::HolidayEvent>> {
            Ok(None)
        }
    }

    fn standard_sources(weather: FixedWeather) -> Vec<Box<dyn EventSource>> {
        vec![
            Box::new(sun_source()),
            Box::new(WeatherSource::new(
                Box::new(weather),
                chrono::Duration::seconds(0),
            )),
            Box::new(CalendarSource::new(&NullCalendar)),
            Box::new(SportsSource::new(&FixedSports::default())),
            Box::new(StocksSource::new(Box::new(FixedMarket(None)))),
            Box::new(SleepSource::new(None)),
        ]
    }

    #[test]
    fn winner_is_deterministic_and_skips_disabled() {
        let mut table = PriorityTable::new(["sun", "weather", "calendar", "sports", "stocks"]);
        table.set(0, 0);
        table.set(1, 5);
        table.set(2, -1);
        table.set(3, -1);
        table.set(4, -1);
        for _ in 0..10 {
            assert_eq!(table.winner(), 1);
        }

        // tie: first declared wins
        table.set(3, 5);
        assert_eq!(table.winner(), 1);

        // everything disabled: fall back to the baseline slot
        let all_off = PriorityTable::new(["sun", "weather"]);
        assert_eq!(all_off.winner(), 0);
    }

    #[test]
    fn priorities_clamp_into_band() {
        let mut table = PriorityTable::new(["sun"]);
        table.set(0, 100);
        assert_eq!(table.get("sun"), Some(6));
        table.set(0, -100);
        assert_eq!(table.get("sun"), Some(-1));
    }

    #[tokio::test]
    async fn thunderstorm_outranks_the_sun() {
        let (client, mut server) = tokio::io::duplex(4096);
        let bus = Arc::new(CommandBus::new(client));
        let state = ControlState::shared();
        let mut scheduler = Scheduler::new(
            standard_sources(FixedWeather(Some("Thunderstorms".into()))),
            state.clone(),
            bus,
        );

        scheduler.tick(at(12, 0)).await;

        assert_eq!(scheduler.table.get("sun"), Some(0));
        assert_eq!(scheduler.table.get("weather"), Some(5));
        assert_eq!(scheduler.table.get("calendar"), Some(-1));
        assert_eq!(scheduler.table.get("sports"), Some(-1));
        assert_eq!(scheduler.table.get("stocks"), Some(-1));
        assert_eq!(state.lock().current_event, "weather");

        drop(scheduler);
        let mut sent = Vec::new();
        server.read_to_end(&mut sent).await.unwrap();
        assert!(sent.starts_with(b"32f0201,i5001"));
        assert_eq!(sent[2..].split(|&b| b == b',').count(), 32);
    }

    #[tokio::test]
    async fn quiet_sky_leaves_the_sun_in_charge() {
        let (client, mut server) = tokio::io::duplex(4096);
        let bus = Arc::new(CommandBus::new(client));
        let state = ControlState::shared();
        let mut scheduler =
            Scheduler::new(standard_sources(FixedWeather(None)), state.clone(), bus);

        scheduler.tick(at(6, 30)).await;
        assert_eq!(state.lock().current_event, "sunrise");

        drop(scheduler);
        let mut sent = Vec::new();
        server.read_to_end(&mut sent).await.unwrap();
        assert_eq!(sent, b":255,010,000");
    }

    #[tokio::test]
    async fn override_flag_suppresses_the_cycle() {
        let (client, mut server) = tokio::io::duplex(4096);
        let bus = Arc::new(CommandBus::new(client));
        let state = ControlState::shared();
        state.lock().interrupt_active = true;
        state.lock().current_event = "interrupt";
        let mut scheduler =
            Scheduler::new(standard_sources(FixedWeather(None)), state.clone(), bus);

        scheduler.tick(at(12, 0)).await;
        assert_eq!(state.lock().current_event, "interrupt");

        drop(scheduler);
        let mut sent = Vec::new();
        server.read_to_end(&mut sent).await.unwrap();
        assert!(sent.is_empty(), "no command may reach the device while overridden");
    }
}
