/*!
 # Device bus

 Exclusive access to the single outbound command channel. Every writer,
 scheduler-dispatched handlers and the interrupt machine alike, goes
 through [`CommandBus::send`], which holds one mutex for the duration of a
 write so command fragments from concurrent senders are never interleaved.
*/

use std::pin::Pin;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{instrument, trace};

use crate::{Error, Result};

/// Serializing writer around the outbound command channel
pub struct CommandBus {
    writer: Mutex<Pin<Box<dyn AsyncWrite + Send>>>,
}

impl CommandBus {
    /// Wraps any byte sink: the opened device in production, an in-memory
    /// stream in tests.
    pub fn new(writer: impl AsyncWrite + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::pin(writer)),
        }
    }

    /// Writes one complete command. Holds the bus lock until the write and
    /// flush finish; a failure is reported to the caller, never retried.
    #[instrument(skip(self, command), fields(len = command.len()))]
    pub async fn send(&self, command: &[u8]) -> Result<()> {
        trace!(command = %String::from_utf8_lossy(command), "sending");
        let mut writer = self.writer.lock().await;
        writer.write_all(command).await.map_err(Error::Bus)?;
        writer.flush().await.map_err(Error::Bus)?;
        Ok(())
    }
}
