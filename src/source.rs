/*!
 # Event sources

 One handler per ambient signal, all behind the [`EventSource`] trait so the
 scheduler can refresh and dispatch them through an explicit, ordered list.
 Each source owns its dynamic priority and its fallback behavior when the
 external collaborator behind it cannot deliver.
*/

use chrono::{DateTime, Duration, Local, NaiveTime, Timelike};
use tracing::{debug, warn};

use crate::color::Color;
use crate::command::{Animation, Chunk, ChunkStyle, PALETTE};
use crate::keyframe::{DayStage, KeyframeSequence};
use crate::provider::{
    CalendarProvider, HolidayEvent, MarketProvider, SportsProvider, WeatherProvider,
};
use crate::{Error, Result};

/// Priority band shared by every source: -1 disables a source for the
/// cycle, 0 is the always-on baseline, 6 is reserved for the enforced
/// sleep window.
pub mod priority {
    pub const DISABLED: i8 = -1;
    pub const BASELINE: i8 = 0;
    pub const DOMINANT: i8 = 6;
}

/// What a dispatched handler hands back: the command to put on the bus
/// (when anything should be sent this cycle) and the event label to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub command: Option<Vec<u8>>,
    pub label: &'static str,
}

/// A single ambient signal competing for the light
pub trait EventSource: Send {
    fn name(&self) -> &'static str;

    /// Recomputes this source's dynamic priority for the coming cycle.
    /// Collaborator failures are absorbed here: the source falls back to
    /// its last-known value or disables itself, it never panics the cycle.
    fn refresh(&mut self, now: DateTime<Local>);

    fn priority(&self) -> i8;

    /// Emits this cycle's command. `repeat` is true when this source also
    /// won the previous cycle, letting static sources skip needless resends.
    fn dispatch(&mut self, now: DateTime<Local>, repeat: bool) -> Result<Dispatch>;
}

const fn fade(timing: u8, palette: u8) -> Chunk {
    Chunk::new(ChunkStyle::Fade, timing, palette)
}

const fn instant(timing: u8, palette: u8) -> Chunk {
    Chunk::new(ChunkStyle::Instant, timing, palette)
}

// ---------------------------------------------------------------------------
// Sun

/// The baseline source: walks the day's keyframe sequence and replays the
/// last reached color once the sequence is exhausted or between keyframes.
pub struct SunSource {
    keyframes: KeyframeSequence,
    last_color: Color,
    last_stage: DayStage,
}

impl SunSource {
    pub fn new(keyframes: KeyframeSequence, initial: Color) -> Self {
        Self {
            keyframes,
            last_color: initial,
            last_stage: DayStage::Sunrise,
        }
    }
}

impl EventSource for SunSource {
    fn name(&self) -> &'static str {
        "sun"
    }

    fn refresh(&mut self, _now: DateTime<Local>) {}

    fn priority(&self) -> i8 {
        priority::BASELINE
    }

    fn dispatch(&mut self, now: DateTime<Local>, _repeat: bool) -> Result<Dispatch> {
        if let Some(frame) = self.keyframes.advance(now) {
            self.last_color = frame.color;
            self.last_stage = DayStage::classify(frame.index, self.keyframes.total());
            debug!(stage = self.last_stage.label(), color = %frame.color, "sun keyframe reached");
        }
        Ok(Dispatch {
            command: Some(self.last_color.to_command()),
            label: self.last_stage.label(),
        })
    }
}

// ---------------------------------------------------------------------------
// Weather

/// Weather classes worth showing, in precedence order: a phrase mentioning
/// thunder outranks its own mention of rain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeatherClass {
    Thunder,
    Snow,
    Rain,
}

const THUNDER_LEAD: [Chunk; 2] = [fade(2, PALETTE.blue), instant(50, PALETTE.blue)];
const THUNDER_PAIRS: [[Chunk; 2]; 2] = [
    // short wait
    [fade(2, PALETTE.blue), instant(25, PALETTE.blue)],
    // flash
    [instant(1, PALETTE.white), fade(2, PALETTE.blue)],
];

const RAIN_LEAD: [Chunk; 2] = [fade(2, PALETTE.light_blue), instant(50, PALETTE.light_blue)];
const RAIN_PAIRS: [[Chunk; 2]; 6] = [
    [fade(5, PALETTE.light_blue), instant(50, PALETTE.light_blue)],
    [fade(5, PALETTE.blue), instant(50, PALETTE.blue)],
    [fade(5, PALETTE.light_blue), instant(25, PALETTE.light_blue)],
    // short plain blue twice: it carries the texture
    [fade(5, PALETTE.blue), instant(25, PALETTE.blue)],
    [fade(5, PALETTE.blue), instant(25, PALETTE.blue)],
    [fade(5, PALETTE.dim_blue), instant(25, PALETTE.dim_blue)],
];

const SNOW_LEAD: [Chunk; 2] = [fade(2, PALETTE.white), instant(50, PALETTE.white)];
const SNOW_PAIRS: [[Chunk; 2]; 2] = [
    [fade(2, PALETTE.white), instant(25, PALETTE.white)],
    [instant(1, PALETTE.dim_white), fade(3, PALETTE.white)],
];

/// Randomly chosen pairs appended after the lead pair, for 32 chunks total
const WEATHER_RANDOM_PAIRS: usize = 15;

impl WeatherClass {
    fn from_phrase(phrase: &str) -> Option<Self> {
        let phrase = phrase.to_lowercase();
        if phrase.contains("thunder") {
            Some(WeatherClass::Thunder)
        } else if phrase.contains("snow") {
            Some(WeatherClass::Snow)
        } else if phrase.contains("rain") {
            Some(WeatherClass::Rain)
        } else {
            None
        }
    }

    fn priority(self) -> i8 {
        match self {
            WeatherClass::Thunder | WeatherClass::Snow => 5,
            WeatherClass::Rain => 2,
        }
    }

    /// Builds the class's animation: the fixed lead pair plus randomly
    /// picked pairs from its chunk vocabulary.
    fn animation(self) -> Result<Vec<u8>> {
        let (lead, vocabulary): (&[Chunk; 2], &[[Chunk; 2]]) = match self {
            WeatherClass::Thunder => (&THUNDER_LEAD, &THUNDER_PAIRS),
            WeatherClass::Rain => (&RAIN_LEAD, &RAIN_PAIRS),
            WeatherClass::Snow => (&SNOW_LEAD, &SNOW_PAIRS),
        };
        let mut picks = [0u8; WEATHER_RANDOM_PAIRS];
        let _ = getrandom::fill(&mut picks);

        let mut animation = Animation::from_chunks(lead.to_vec())?;
        for pick in picks {
            let pair = vocabulary[pick as usize % vocabulary.len()];
            animation.push(pair[0])?;
            animation.push(pair[1])?;
        }
        Ok(animation.encode())
    }
}

/// Reclassifies the sky every cycle, re-fetching the phrase at a bounded
/// cadence. A failed fetch keeps the last-known phrase.
pub struct WeatherSource {
    provider: Box<dyn WeatherProvider>,
    refresh_every: Duration,
    last_fetch: Option<DateTime<Local>>,
    phrase: Option<String>,
    priority: i8,
}

impl WeatherSource {
    pub fn new(provider: Box<dyn WeatherProvider>, refresh_every: Duration) -> Self {
        Self {
            provider,
            refresh_every,
            last_fetch: None,
            phrase: None,
            priority: priority::DISABLED,
        }
    }

    fn class(&self) -> Option<WeatherClass> {
        self.phrase.as_deref().and_then(WeatherClass::from_phrase)
    }
}

impl EventSource for WeatherSource {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn refresh(&mut self, now: DateTime<Local>) {
        let due = match self.last_fetch {
            None => true,
            Some(at) => now - at > self.refresh_every,
        };
        if due {
            match self.provider.current_phrase() {
                Ok(phrase) => {
                    debug!(%phrase, "weather refreshed");
                    self.phrase = Some(phrase);
                    self.last_fetch = Some(now);
                }
                Err(e) => {
                    warn!(error = %e, "weather refresh failed, keeping last-known phrase");
                    self.last_fetch = Some(now);
                }
            }
        }
        self.priority = self
            .class()
            .map(WeatherClass::priority)
            .unwrap_or(priority::DISABLED);
    }

    fn priority(&self) -> i8 {
        self.priority
    }

    fn dispatch(&mut self, _now: DateTime<Local>, _repeat: bool) -> Result<Dispatch> {
        let class = self.class().ok_or(Error::DataUnavailable {
            source_name: "weather",
            reason: "dispatched without a classified phrase".into(),
        })?;
        Ok(Dispatch {
            command: Some(class.animation()?),
            label: "weather",
        })
    }
}

// ---------------------------------------------------------------------------
// Calendar

/// Today's holiday, if any: a fixed command at a fixed priority for the
/// whole day, read once at startup.
pub struct CalendarSource {
    event: Option<HolidayEvent>,
}

impl CalendarSource {
    pub fn new(provider: &dyn CalendarProvider) -> Self {
        let event = match provider.todays_event() {
            Ok(event) => {
                if let Some(ref e) = event {
                    debug!(holiday = %e.name, priority = e.priority, "calendar event today");
                }
                event
            }
            Err(e) => {
                warn!(error = %e, "calendar unavailable, source disabled for the day");
                None
            }
        };
        Self { event }
    }
}

impl EventSource for CalendarSource {
    fn name(&self) -> &'static str {
        "calendar"
    }

    fn refresh(&mut self, _now: DateTime<Local>) {}

    fn priority(&self) -> i8 {
        self.event
            .as_ref()
            .map(|e| e.priority)
            .unwrap_or(priority::DISABLED)
    }

    fn dispatch(&mut self, _now: DateTime<Local>, repeat: bool) -> Result<Dispatch> {
        let event = self.event.as_ref().ok_or(Error::DataUnavailable {
            source_name: "calendar",
            reason: "dispatched without a holiday".into(),
        })?;
        Ok(Dispatch {
            // the command is a loop the device keeps playing; only send it
            // when we newly take over
            command: (!repeat).then(|| event.command.clone()),
            label: "calendar",
        })
    }
}

// ---------------------------------------------------------------------------
// Sports

const RANGERS_WIN: [Chunk; 4] = [
    fade(10, PALETTE.red),
    instant(50, PALETTE.red),
    fade(10, PALETTE.blue),
    instant(50, PALETTE.blue),
];

const STEELERS_WIN: [Chunk; 4] = [
    fade(10, PALETTE.yellow),
    instant(50, PALETTE.yellow),
    fade(2, PALETTE.off),
    instant(50, PALETTE.off),
];

/// Followed teams in preference order: when several won last night, the
/// first listed one gets the lights.
const TEAM_PREFERENCE: [&str; 2] = ["rangers", "steelers"];

pub struct SportsSource {
    winner: Option<&'static str>,
}

impl SportsSource {
    pub fn new(provider: &dyn SportsProvider) -> Self {
        let results = match provider.results() {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "sports results unavailable, source disabled for the day");
                Vec::new()
            }
        };
        let winner = TEAM_PREFERENCE.into_iter().find(|team| {
            results
                .iter()
                .any(|r| r.won && r.team.eq_ignore_ascii_case(team))
        });
        if let Some(team) = winner {
            debug!(team, "sports win to celebrate");
        }
        Self { winner }
    }
}

impl EventSource for SportsSource {
    fn name(&self) -> &'static str {
        "sports"
    }

    fn refresh(&mut self, _now: DateTime<Local>) {}

    fn priority(&self) -> i8 {
        if self.winner.is_some() {
            3
        } else {
            priority::DISABLED
        }
    }

    fn dispatch(&mut self, _now: DateTime<Local>, _repeat: bool) -> Result<Dispatch> {
        let chunks = match self.winner {
            Some("rangers") => RANGERS_WIN,
            Some("steelers") => STEELERS_WIN,
            _ => {
                return Err(Error::DataUnavailable {
                    source_name: "sports",
                    reason: "dispatched without a winning team".into(),
                })
            }
        };
        Ok(Dispatch {
            command: Some(Animation::from_chunks(chunks.to_vec())?.encode()),
            label: "sports",
        })
    }
}

// ---------------------------------------------------------------------------
// Stocks

const MARKET_CLOSE_HOUR: u32 = 16;

const GAIN_PULSE: [Chunk; 3] = [
    fade(10, PALETTE.green),
    instant(99, PALETTE.green),
    fade(5, PALETTE.off),
];
const GAIN_DOUBLE_PULSE: [Chunk; 5] = [
    fade(10, PALETTE.green),
    instant(99, PALETTE.green),
    fade(5, PALETTE.off),
    fade(5, PALETTE.green),
    fade(5, PALETTE.off),
];
const LOSS_PULSE: [Chunk; 3] = [
    fade(10, PALETTE.red),
    instant(99, PALETTE.red),
    fade(5, PALETTE.off),
];
const LOSS_DOUBLE_PULSE: [Chunk; 5] = [
    fade(10, PALETTE.red),
    instant(99, PALETTE.red),
    fade(5, PALETTE.off),
    fade(5, PALETTE.red),
    fade(5, PALETTE.off),
];

/// Checks the index delta once per day after the market closes and maps it
/// to a pulse animation: single pulse for a notable move, double for a big
/// one, green up, red down.
pub struct StocksSource {
    provider: Box<dyn MarketProvider>,
    fetched: bool,
    chunks: Option<Vec<Chunk>>,
    priority: i8,
}

impl StocksSource {
    pub fn new(provider: Box<dyn MarketProvider>) -> Self {
        Self {
            provider,
            fetched: false,
            chunks: None,
            priority: priority::DISABLED,
        }
    }

    fn classify(delta: f64) -> Option<(Vec<Chunk>, i8)> {
        if delta >= 300.0 {
            Some((GAIN_DOUBLE_PULSE.to_vec(), 3))
        } else if delta >= 200.0 {
            Some((GAIN_PULSE.to_vec(), 2))
        } else if delta <= -300.0 {
            Some((LOSS_DOUBLE_PULSE.to_vec(), 3))
        } else if delta < -150.0 {
            Some((LOSS_PULSE.to_vec(), 2))
        } else {
            None
        }
    }
}

impl EventSource for StocksSource {
    fn name(&self) -> &'static str {
        "stocks"
    }

    fn refresh(&mut self, now: DateTime<Local>) {
        if self.fetched || now.hour() < MARKET_CLOSE_HOUR {
            return;
        }
        // one attempt per day, best-effort
        self.fetched = true;
        match self.provider.index_delta() {
            Ok(delta) => {
                debug!(delta, "market delta fetched");
                if let Some((chunks, priority)) = Self::classify(delta) {
                    self.chunks = Some(chunks);
                    self.priority = priority;
                }
            }
            Err(e) => warn!(error = %e, "market fetch failed, source stays disabled"),
        }
    }

    fn priority(&self) -> i8 {
        self.priority
    }

    fn dispatch(&mut self, _now: DateTime<Local>, _repeat: bool) -> Result<Dispatch> {
        let chunks = self.chunks.clone().ok_or(Error::DataUnavailable {
            source_name: "stocks",
            reason: "dispatched without a market classification".into(),
        })?;
        Ok(Dispatch {
            command: Some(Animation::from_chunks(chunks)?.encode()),
            label: "stocks",
        })
    }
}

// ---------------------------------------------------------------------------
// Sleep

/// Dim red shown through the enforced sleep window
const SLEEP_COLOR: Color = Color::new(2, 0, 0);

/// Unconditionally dominant inside the configured quiet-hours window.
/// A window whose start is after its end spans midnight.
pub struct SleepSource {
    window: Option<(NaiveTime, NaiveTime)>,
    priority: i8,
}

impl SleepSource {
    pub fn new(window: Option<(NaiveTime, NaiveTime)>) -> Self {
        Self {
            window,
            priority: priority::DISABLED,
        }
    }

    fn in_window(&self, now: NaiveTime) -> bool {
        match self.window {
            None => false,
            Some((start, end)) if start <= end => now >= start && now < end,
            Some((start, end)) => now >= start || now < end,
        }
    }
}

impl EventSource for SleepSource {
    fn name(&self) -> &'static str {
        "sleep"
    }

    fn refresh(&mut self, now: DateTime<Local>) {
        self.priority = if self.in_window(now.time()) {
            priority::DOMINANT
        } else {
            priority::DISABLED
        };
    }

    fn priority(&self) -> i8 {
        self.priority
    }

    fn dispatch(&mut self, _now: DateTime<Local>, _repeat: bool) -> Result<Dispatch> {
        Ok(Dispatch {
            command: Some(SLEEP_COLOR.to_command()),
            label: "sleep",
        })
    }
}
