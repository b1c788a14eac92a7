/*!
 # Aura Ambient LED Controller

 A daemon and library for driving a serial RGB light controller from ambient
 events: the day/night cycle, weather, calendar holidays, sports results,
 market movement and enforced sleep hours. A control-plane socket lets a
 remote operator override the automatic selection (movie mode, sleep mode,
 custom colors) until explicitly cancelled; the active override survives
 process restarts.

 ## Device protocol

 The controller accepts ASCII commands on its inbound channel:

 * `:RRR,GGG,BBB` sets a static color, each channel zero-padded to 3 digits.
 * `NNXttCC,XttCC,...` programs an animation loop. `NN` is the chunk count
   (max 99), `X` is `f` (fade, repeating), `i` (instant, repeating), `s`
   (fade, one-shot) or `c` (instant, one-shot), `tt` a timing value and `CC`
   an index into the device palette table. Loops repeat until a new command
   arrives.

 Examples: `:200,000,050` (purple), `10f0501,i5001,i0103,f0201,...`
 (thunderstorm).

 ## Control-plane protocol

 One opcode per TCP exchange: `1` queries the current event label; `m`, `z`,
 `r`, `s`, `o` engage the movie/sleep/relax/music/off overrides; `x` cancels
 the active override; `c` + 12 bytes sets a custom static color; `v` + an
 animation string programs a custom loop. Every mutating opcode is answered
 with the resulting event label.

 ## Example

 ```no_run
 use aura_led_controller::{CommandBus, Color, Error};

 #[tokio::main]
 async fn main() -> aura_led_controller::Result<()> {
     let device = tokio::fs::OpenOptions::new()
         .write(true)
         .open("/dev/ttyUSB0")
         .await
         .map_err(Error::DeviceUnavailable)?;
     let bus = CommandBus::new(device);
     bus.send(&Color::new(255, 10, 0).to_command()).await?;
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the aura LED controller library
#[derive(Error, Debug)]
pub enum Error {
    /// The outbound command device could not be opened. Fatal at startup:
    /// nothing works without the device.
    #[error("unable to open command device: {0}")]
    DeviceUnavailable(#[source] std::io::Error),

    /// A write on the outbound command channel failed
    #[error("device write failed: {0}")]
    Bus(#[source] std::io::Error),

    /// A malformed command arrived on the control plane
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The override record could not be persisted or read back
    #[error("persistence failure: {0}")]
    Persistence(#[source] std::io::Error),

    /// An external collaborator could not produce its value
    #[error("external data unavailable from {source_name}: {reason}")]
    DataUnavailable {
        source_name: &'static str,
        reason: String,
    },

    /// An animation exceeded the device's chunk limit
    #[error("animation has {0} chunks, device limit is {1}")]
    TooManyChunks(usize, usize),

    /// Sunset did not come after sunrise
    #[error("invalid daylight window: sunset {set} is not after sunrise {rise}")]
    InvalidWindow {
        rise: chrono::DateTime<chrono::Local>,
        set: chrono::DateTime<chrono::Local>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod bus;
pub mod color;
pub mod command;
pub mod interrupt;
pub mod keyframe;
pub mod listener;
pub mod provider;
pub mod scheduler;
pub mod source;
pub mod store;

pub use bus::CommandBus;
pub use color::Color;
pub use interrupt::{InterruptController, InterruptSignal, OverrideMode};
pub use keyframe::{DayStage, KeyframeSequence};
pub use scheduler::{ControlState, Scheduler, SharedState};
pub use store::StateStore;
