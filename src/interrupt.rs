/*!
 # Interrupt state machine

 Operator overrides preempt the scheduler: a single-token signal moves the
 system from Normal into an Overridden mode, pushes that mode's command to
 the device and persists the raw signal so an unplanned restart lands back
 in the same mode. Cancelling clears everything and wakes the scheduler for
 an immediate re-evaluation instead of waiting out the timer.
*/

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use crate::bus::CommandBus;
use crate::command::{self, Animation, Chunk, ChunkStyle, PALETTE};
use crate::scheduler::SharedState;
use crate::store::StateStore;
use crate::{Error, Result};

/// Named override modes and their control-plane tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideMode {
    /// `m`: warm fade-in, then a steady movie orange
    Movie,
    /// `z`: barely-glowing red for the night
    Sleep,
    /// `r`: slow fade between dim purple and dim blue
    Relax,
    /// `s`: hand the strip to the device's sound-reactive mode
    Music,
    /// `o`: lights out
    Off,
}

impl OverrideMode {
    pub fn token(self) -> u8 {
        match self {
            OverrideMode::Movie => b'm',
            OverrideMode::Sleep => b'z',
            OverrideMode::Relax => b'r',
            OverrideMode::Music => b's',
            OverrideMode::Off => b'o',
        }
    }

    fn from_token(token: u8) -> Option<Self> {
        match token {
            b'm' => Some(OverrideMode::Movie),
            b'z' => Some(OverrideMode::Sleep),
            b'r' => Some(OverrideMode::Relax),
            b's' => Some(OverrideMode::Music),
            b'o' => Some(OverrideMode::Off),
            _ => None,
        }
    }

    /// The entry sequence: commands with an optional pause after each.
    /// Movie fades in before settling, relax starts its two-color loop;
    /// the rest enter directly in their static form.
    fn entry_steps(self) -> Vec<(Vec<u8>, Option<Duration>)> {
        match self {
            OverrideMode::Movie => vec![
                (
                    anim(&[
                        Chunk::new(ChunkStyle::Fade, 2, PALETTE.white),
                        Chunk::new(ChunkStyle::Fade, 2, PALETTE.orange),
                        Chunk::new(ChunkStyle::Fade, 8, PALETTE.movie_orange),
                    ]),
                    Some(Duration::from_secs(2)),
                ),
                (self.resume_command(), None),
            ],
            OverrideMode::Relax => vec![(
                anim(&[
                    Chunk::new(ChunkStyle::Fade, 8, PALETTE.dim_purple),
                    Chunk::new(ChunkStyle::Fade, 8, PALETTE.dim_blue),
                ]),
                None,
            )],
            _ => vec![(self.resume_command(), None)],
        }
    }

    /// The static form of the mode, used when restoring after a restart so
    /// the entry animation is not replayed mid-movie.
    fn resume_command(self) -> Vec<u8> {
        match self {
            OverrideMode::Movie => anim(&[Chunk::new(ChunkStyle::Instant, 0, PALETTE.movie_orange)]),
            OverrideMode::Sleep => b":002,000,000".to_vec(),
            OverrideMode::Relax => b":010,000,015".to_vec(),
            OverrideMode::Music => b"s".to_vec(),
            OverrideMode::Off => b":000,000,000".to_vec(),
        }
    }
}

// Fixed animations are known-small, the chunk limit cannot trip
fn anim(chunks: &[Chunk]) -> Vec<u8> {
    Animation::from_chunks(chunks.to_vec()).unwrap().encode()
}

/// A validated control-plane signal, convertible to and from the raw bytes
/// that travel the wire and land in the state store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptSignal {
    /// `x`: back to Normal
    Cancel,
    Mode(OverrideMode),
    /// `c` + a full `:RRR,GGG,BBB` payload, forwarded verbatim
    CustomColor(Vec<u8>),
    /// `v` + an animation command, forwarded verbatim
    CustomPattern(Vec<u8>),
}

impl InterruptSignal {
    /// Parses opcode + payload. Anything malformed is rejected before any
    /// state can change.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (&opcode, payload) = raw
            .split_first()
            .ok_or_else(|| Error::Protocol("empty signal".into()))?;
        match opcode {
            b'x' => Ok(InterruptSignal::Cancel),
            b'c' => {
                command::validate_color_payload(payload)?;
                Ok(InterruptSignal::CustomColor(payload.to_vec()))
            }
            b'v' => {
                command::validate_animation_payload(payload)?;
                Ok(InterruptSignal::CustomPattern(payload.to_vec()))
            }
            token => OverrideMode::from_token(token)
                .map(InterruptSignal::Mode)
                .ok_or_else(|| Error::Protocol(format!("unknown opcode {:?}", token as char))),
        }
    }

    /// The persisted record format: exactly the wire bytes.
    pub fn to_record(&self) -> Vec<u8> {
        match self {
            InterruptSignal::Cancel => vec![b'x'],
            InterruptSignal::Mode(mode) => vec![mode.token()],
            InterruptSignal::CustomColor(payload) => {
                let mut raw = vec![b'c'];
                raw.extend_from_slice(payload);
                raw
            }
            InterruptSignal::CustomPattern(payload) => {
                let mut raw = vec![b'v'];
                raw.extend_from_slice(payload);
                raw
            }
        }
    }
}

/// Accepts preemption signals, drives the device while Overridden and owns
/// the persisted override record.
pub struct InterruptController {
    bus: Arc<CommandBus>,
    state: SharedState,
    store: StateStore,
    wake: Arc<Notify>,
}

impl InterruptController {
    pub fn new(bus: Arc<CommandBus>, state: SharedState, store: StateStore, wake: Arc<Notify>) -> Self {
        Self {
            bus,
            state,
            store,
            wake,
        }
    }

    /// Applies one signal and returns the resulting event label.
    ///
    /// For override signals the record is persisted before anything else:
    /// if this process dies right after the caller gets its answer, the
    /// stored record matches the acknowledged state. A persistence failure
    /// aborts the whole transition.
    #[instrument(skip(self))]
    pub async fn fire(&self, signal: InterruptSignal) -> Result<&'static str> {
        if signal == InterruptSignal::Cancel {
            self.store.clear()?;
            {
                let mut state = self.state.lock();
                state.interrupt_active = false;
                state.current_event = "none";
            }
            // don't make the room wait out the timer interval
            self.wake.notify_one();
            info!("override cancelled, scheduler resumes");
            return Ok("none");
        }

        self.store.save(&signal.to_record())?;
        {
            let mut state = self.state.lock();
            state.interrupt_active = true;
            state.current_event = "interrupt";
        }
        self.emit_entry(&signal).await?;
        info!(?signal, "override engaged");
        Ok("interrupt")
    }

    async fn emit_entry(&self, signal: &InterruptSignal) -> Result<()> {
        match signal {
            InterruptSignal::Cancel => Ok(()),
            InterruptSignal::Mode(mode) => {
                for (command, pause) in mode.entry_steps() {
                    self.bus.send(&command).await?;
                    if let Some(pause) = pause {
                        tokio::time::sleep(pause).await;
                    }
                }
                Ok(())
            }
            InterruptSignal::CustomColor(payload) | InterruptSignal::CustomPattern(payload) => {
                self.bus.send(payload).await
            }
        }
    }

    /// Restores a persisted override at startup, using the mode's static
    /// resume command so an interrupted movie night doesn't get a second
    /// fade-in. A stale cancel record or an unreadable record is cleared
    /// and ignored.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> Result<()> {
        let Some(record) = self.store.load()? else {
            debug!("no persisted override");
            return Ok(());
        };
        let signal = match InterruptSignal::parse(&record) {
            Ok(InterruptSignal::Cancel) => {
                self.store.clear()?;
                return Ok(());
            }
            Ok(signal) => signal,
            Err(e) => {
                warn!(error = %e, "unreadable override record, clearing");
                self.store.clear()?;
                return Ok(());
            }
        };

        {
            let mut state = self.state.lock();
            state.interrupt_active = true;
            state.current_event = "interrupt";
        }
        let command = match &signal {
            InterruptSignal::Mode(mode) => mode.resume_command(),
            InterruptSignal::CustomColor(payload) | InterruptSignal::CustomPattern(payload) => {
                payload.clone()
            }
            InterruptSignal::Cancel => unreachable!("handled above"),
        };
        self.bus.send(&command).await?;
        info!(?signal, "override resumed after restart");
        Ok(())
    }
}
