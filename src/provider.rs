/*!
 # External data providers

 The event sources depend on outside collaborators: sun times, the current
 weather phrase, the tower-light calendar, sports results, market movement.
 Fetching any of that is not this crate's business: each collaborator is a
 trait returning a typed value, and every fetch attempt is independent and
 best-effort. The implementations here are the fixed/file-backed ones the
 daemon wires by default; network-backed ones plug into the same traits.
*/

use chrono::{DateTime, Local, NaiveTime};
use tracing::warn;

use crate::color::Color;
use crate::{Error, Result};

/// Today's sunrise and sunset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    pub rise: DateTime<Local>,
    pub set: DateTime<Local>,
}

/// A holiday entry for today: the command to display and its fixed priority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayEvent {
    pub name: String,
    pub command: Vec<u8>,
    pub priority: i8,
}

/// One followed team's result from last night
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamResult {
    pub team: String,
    pub won: bool,
}

pub trait SunProvider: Send {
    fn sun_times(&self) -> Result<SunTimes>;
}

/// Tonight's color of the downtown tower, when it announces one worth copying
pub trait TowerProvider: Send {
    fn tonight_color(&self) -> Result<Option<Color>>;
}

/// Current weather condition phrase, e.g. "Thunderstorms"
pub trait WeatherProvider: Send {
    fn current_phrase(&self) -> Result<String>;
}

pub trait CalendarProvider: Send {
    fn todays_event(&self) -> Result<Option<HolidayEvent>>;
}

pub trait SportsProvider: Send {
    fn results(&self) -> Result<Vec<TeamResult>>;
}

/// Daily index delta, available after the market closes
pub trait MarketProvider: Send {
    fn index_delta(&self) -> Result<f64>;
}

/// Sun times at fixed wall-clock hours, today. The stand-in when no
/// forecast service is wired up; defaults match the historical fallback.
#[derive(Debug, Clone, Copy)]
pub struct FixedSun {
    pub rise: NaiveTime,
    pub set: NaiveTime,
}

impl Default for FixedSun {
    fn default() -> Self {
        Self {
            rise: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            set: NaiveTime::from_hms_opt(20, 30, 0).unwrap(),
        }
    }
}

impl SunProvider for FixedSun {
    fn sun_times(&self) -> Result<SunTimes> {
        let today = Local::now().date_naive();
        let to_local = |t: NaiveTime| {
            today
                .and_time(t)
                .and_local_timezone(Local)
                .earliest()
                .ok_or(Error::DataUnavailable {
                    source_name: "sun",
                    reason: "time does not exist in the local timezone today".into(),
                })
        };
        Ok(SunTimes {
            rise: to_local(self.rise)?,
            set: to_local(self.set)?,
        })
    }
}

/// No tower feed: the keyframe engine synthesizes its own terminal color
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTower;

impl TowerProvider for NoTower {
    fn tonight_color(&self) -> Result<Option<Color>> {
        Ok(None)
    }
}

/// A canned weather phrase, or none at all
#[derive(Debug, Clone, Default)]
pub struct FixedWeather(pub Option<String>);

impl WeatherProvider for FixedWeather {
    fn current_phrase(&self) -> Result<String> {
        self.0.clone().ok_or(Error::DataUnavailable {
            source_name: "weather",
            reason: "no weather feed configured".into(),
        })
    }
}

/// Holiday calendar file in `YYYY-MM-DD|name|command|priority` lines
#[derive(Debug, Clone)]
pub struct FileCalendar {
    pub path: std::path::PathBuf,
}

impl CalendarProvider for FileCalendar {
    fn todays_event(&self) -> Result<Option<HolidayEvent>> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| Error::DataUnavailable {
            source_name: "calendar",
            reason: format!("{}: {e}", self.path.display()),
        })?;
        let today = Local::now().date_naive().to_string();
        for line in text.lines() {
            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() != 4 {
                if !line.trim().is_empty() {
                    warn!(line, "skipping malformed holiday line");
                }
                continue;
            }
            if fields[0] != today {
                continue;
            }
            let priority: i8 = match fields[3].trim().parse() {
                Ok(p) => p,
                Err(_) => {
                    warn!(line, "skipping holiday line with bad priority");
                    continue;
                }
            };
            return Ok(Some(HolidayEvent {
                name: fields[1].to_string(),
                command: fields[2].as_bytes().to_vec(),
                priority: priority.clamp(-1, 6),
            }));
        }
        Ok(None)
    }
}

/// Canned sports results (empty by default: nobody played)
#[derive(Debug, Clone, Default)]
pub struct FixedSports(pub Vec<TeamResult>);

impl SportsProvider for FixedSports {
    fn results(&self) -> Result<Vec<TeamResult>> {
        Ok(self.0.clone())
    }
}

/// A canned market delta, or no feed at all
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMarket(pub Option<f64>);

impl MarketProvider for FixedMarket {
    fn index_delta(&self) -> Result<f64> {
        self.0.ok_or(Error::DataUnavailable {
            source_name: "stocks",
            reason: "no market feed configured".into(),
        })
    }
}
