/*!
 # Keyframe engine

 Builds the day's sunrise→solar-noon→sunset color ramp as an ordered queue
 of time-keyed keyframes and advances through it monotonically. The daemon
 is expected to be (re)started each day before sunrise, so the sequence is
 built once per process from that day's sun data.
*/

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Local};
use tracing::debug;

use crate::color::Color;
use crate::{Error, Result};

/// A scheduled color change: at `at`, the strip should show `color`.
/// `index` is the keyframe's position in the full day, used afterward to
/// classify the daylight stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyframe {
    pub at: DateTime<Local>,
    pub color: Color,
    pub index: usize,
}

/// Daylight stage derived from a keyframe's position in the day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStage {
    Sunrise,
    Midday,
    Sunset,
    Sundown,
}

impl DayStage {
    /// Classifies a keyframe index against the sequence's total count:
    /// first quartile is sunrise, the middle half is midday, the last
    /// quartile is sunset, and the final keyframe is sundown.
    pub fn classify(index: usize, total: usize) -> Self {
        if index + 1 >= total {
            DayStage::Sundown
        } else if index * 4 <= total {
            DayStage::Sunrise
        } else if index * 4 <= total * 3 {
            DayStage::Midday
        } else {
            DayStage::Sunset
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DayStage::Sunrise => "sunrise",
            DayStage::Midday => "midday",
            DayStage::Sunset => "sunset",
            DayStage::Sundown => "sundown",
        }
    }
}

/// First-in-first-out queue of the day's keyframes. Consumption is
/// one-directional: a popped keyframe is never revisited.
#[derive(Debug)]
pub struct KeyframeSequence {
    frames: VecDeque<Keyframe>,
    total: usize,
}

impl KeyframeSequence {
    /// Builds the full sunrise-to-sunset sequence, one keyframe per hour.
    ///
    /// The interval is split into hourly slots (a fractional remainder over
    /// 30 minutes rounds the slot count up). The first half of the slots
    /// ramps `rise`→`mid`, the second half `mid`→`set`; odd counts give the
    /// rise half the extra slot. Interpolation is per-channel and
    /// integer-stepped, with the final slot of each half force-set to the
    /// exact anchor so rounding never drifts the endpoints. When `set` is
    /// not supplied a random dim color stands in.
    ///
    /// Windows too short for interpolation degrade to anchor-only frames:
    /// the first keyframe always carries `rise` and the last always carries
    /// the terminal color.
    pub fn build(
        sunrise: DateTime<Local>,
        sunset: DateTime<Local>,
        rise: Color,
        mid: Color,
        set: Option<Color>,
    ) -> Result<Self> {
        if sunset <= sunrise {
            return Err(Error::InvalidWindow {
                rise: sunrise,
                set: sunset,
            });
        }

        let daylight = sunset - sunrise;
        let mut hours = daylight.num_hours() as usize;
        if daylight.num_minutes() % 60 > 30 {
            hours += 1;
        }
        // Anchor-only fallback for sub-hour windows: one rise slot, one set slot
        let hours = hours.max(2);

        let mut rise_slots = hours / 2;
        let set_slots = hours / 2;
        if rise_slots * 2 != hours {
            rise_slots += 1;
        }

        let set = set.unwrap_or_else(|| {
            let fallback = Color::random_dim();
            debug!(%fallback, "no terminal color available, synthesized a dim one");
            fallback
        });

        let mut frames = VecDeque::with_capacity(rise_slots + set_slots);
        let mut index = 0;
        let mut push = |frames: &mut VecDeque<Keyframe>, hour_offset: usize, color: Color| {
            frames.push_back(Keyframe {
                at: sunrise + Duration::hours(hour_offset as i64),
                color,
                index,
            });
            index += 1;
        };

        if rise_slots == 1 {
            push(&mut frames, 0, rise);
        } else {
            let step = channel_steps(rise, mid, rise_slots - 1);
            for slot in 0..rise_slots - 1 {
                push(&mut frames, slot, step_color(rise, step, slot));
            }
            push(&mut frames, rise_slots - 1, mid);
        }

        if set_slots == 1 {
            push(&mut frames, rise_slots, set);
        } else {
            let step = channel_steps(mid, set, set_slots - 1);
            for slot in 0..set_slots - 1 {
                push(&mut frames, rise_slots + slot, step_color(mid, step, slot));
            }
            push(&mut frames, rise_slots + set_slots - 1, set);
        }

        let total = frames.len();
        debug!(total, %rise, %mid, %set, "built daylight keyframes");
        Ok(Self { frames, total })
    }

    /// Pops every keyframe whose trigger time has elapsed and returns the
    /// last of them, or `None` when nothing new has elapsed. Skip-ahead
    /// lets the caller tick far less often than keyframes are spaced; on
    /// `None` the caller replays the previously returned color.
    pub fn advance(&mut self, now: DateTime<Local>) -> Option<Keyframe> {
        let mut latest = None;
        while let Some(front) = self.frames.front() {
            if front.at <= now {
                latest = self.frames.pop_front();
            } else {
                break;
            }
        }
        latest
    }

    /// Total number of keyframes the day was built with (stable across
    /// consumption; used for stage classification).
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Per-channel integer step between two anchors over `steps` hops,
/// truncated toward zero like the device expects.
fn channel_steps(from: Color, to: Color, steps: usize) -> (i32, i32, i32) {
    let steps = steps as i32;
    (
        (i32::from(to.r) - i32::from(from.r)) / steps,
        (i32::from(to.g) - i32::from(from.g)) / steps,
        (i32::from(to.b) - i32::from(from.b)) / steps,
    )
}

fn step_color(from: Color, step: (i32, i32, i32), slot: usize) -> Color {
    let slot = slot as i32;
    let clamp = |v: i32| v.clamp(0, 255) as u8;
    Color::new(
        clamp(i32::from(from.r) + step.0 * slot),
        clamp(i32::from(from.g) + step.1 * slot),
        clamp(i32::from(from.b) + step.2 * slot),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RISE: Color = Color::new(255, 10, 0);
    const MID: Color = Color::new(255, 255, 255);
    const SET: Color = Color::new(40, 0, 80);

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 5, hour, minute, 0).unwrap()
    }

    fn build(rise_t: DateTime<Local>, set_t: DateTime<Local>) -> KeyframeSequence {
        KeyframeSequence::build(rise_t, set_t, RISE, MID, Some(SET)).unwrap()
    }

    #[test]
    fn rejects_inverted_window() {
        assert!(matches!(
            KeyframeSequence::build(at(20, 0), at(6, 0), RISE, MID, Some(SET)),
            Err(Error::InvalidWindow { .. })
        ));
    }

    #[test]
    fn anchors_hold_at_both_ends() {
        let mut seq = build(at(6, 0), at(20, 30));
        // 14h30m rounds down to 14 slots, 7 per half
        assert_eq!(seq.total(), 14);
        let mut all = Vec::new();
        while let Some(f) = seq.frames.pop_front() {
            all.push(f);
        }
        assert_eq!(all.first().unwrap().color, RISE);
        assert_eq!(all[6].color, MID);
        assert_eq!(all.last().unwrap().color, SET);
    }

    #[test]
    fn trigger_times_strictly_increase() {
        let seq = build(at(6, 0), at(20, 31));
        // 14h31m rounds up to 15 slots
        assert_eq!(seq.total(), 15);
        let times: Vec<_> = seq.frames.iter().map(|f| f.at).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn advance_skips_ahead_to_latest_elapsed() {
        let mut seq = build(at(6, 0), at(18, 0));
        // Three hours elapse between ticks: only the latest keyframe comes back
        let frame = seq.advance(at(9, 10)).unwrap();
        assert_eq!(frame.index, 3);
        assert_eq!(seq.remaining(), seq.total() - 4);
    }

    #[test]
    fn advance_is_none_between_keyframes() {
        let mut seq = build(at(6, 0), at(18, 0));
        assert!(seq.advance(at(5, 0)).is_none());
        let first = seq.advance(at(6, 0)).unwrap();
        assert_eq!(first.color, RISE);
        assert!(seq.advance(at(6, 30)).is_none());
    }

    #[test]
    fn advance_never_goes_backward() {
        let mut seq = build(at(6, 0), at(18, 0));
        let mut last_index = None;
        for hour in 6..22 {
            if let Some(frame) = seq.advance(at(hour, 5)) {
                if let Some(prev) = last_index {
                    assert!(frame.index > prev);
                }
                last_index = Some(frame.index);
            }
        }
        assert!(seq.is_exhausted());
    }

    #[test]
    fn sub_hour_window_emits_anchors_only() {
        let mut seq = build(at(6, 0), at(6, 20));
        assert_eq!(seq.total(), 2);
        assert_eq!(seq.advance(at(6, 0)).unwrap().color, RISE);
        assert_eq!(seq.advance(at(7, 0)).unwrap().color, SET);
    }

    #[test]
    fn missing_set_color_synthesizes_dim_terminal() {
        let seq = KeyframeSequence::build(at(6, 0), at(18, 0), RISE, MID, None).unwrap();
        let last = seq.frames.back().unwrap().color;
        assert!(last.r == 0 || last.g == 0 || last.b == 0);
    }

    #[test]
    fn stages_follow_quartiles() {
        let total = 12;
        assert_eq!(DayStage::classify(0, total), DayStage::Sunrise);
        assert_eq!(DayStage::classify(3, total), DayStage::Sunrise);
        assert_eq!(DayStage::classify(4, total), DayStage::Midday);
        assert_eq!(DayStage::classify(9, total), DayStage::Midday);
        assert_eq!(DayStage::classify(10, total), DayStage::Sunset);
        assert_eq!(DayStage::classify(11, total), DayStage::Sundown);
    }
}
