/*!
 # Control-plane listener

 Accepts operator connections one at a time: signal ordering matters and
 traffic is a handful of exchanges a day, so there is deliberately no
 per-connection task fan-out. Each exchange reads one opcode (plus its
 payload where the opcode has one), answers a status query from the shared
 state or forwards the signal to the interrupt machine, and replies with
 the resulting event label.
*/

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::command::COLOR_PAYLOAD_LEN;
use crate::interrupt::{InterruptController, InterruptSignal};
use crate::scheduler::SharedState;
use crate::{Error, Result};

/// How long to block in accept before looping for another try
const ACCEPT_IDLE: Duration = Duration::from_secs(30);

/// Per-read deadline inside one exchange
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a custom animation payload: a full 99-chunk command
const MAX_PATTERN_PAYLOAD: u64 = 600;

/// Runs the accept loop forever. Accept failures back off briefly instead
/// of spinning; an idle accept timeout just loops.
pub async fn run(listener: TcpListener, interrupt: Arc<InterruptController>, state: SharedState) {
    info!("control plane listening");
    loop {
        let (stream, peer) = match timeout(ACCEPT_IDLE, listener.accept()).await {
            Err(_) => {
                trace!("no control-plane traffic");
                continue;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "accept failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
            Ok(Ok(pair)) => pair,
        };
        debug!(%peer, "control-plane connection");
        if let Err(e) = serve(stream, &interrupt, &state).await {
            warn!(%peer, error = %e, "control-plane exchange failed");
        }
    }
}

/// Handles one connection: one opcode, one reply. Rejections reply with an
/// `ERR` line and leave all state untouched; internal failures also bubble
/// up to the caller for logging.
async fn serve<S>(mut stream: S, interrupt: &InterruptController, state: &SharedState) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match process(&mut stream, interrupt, state).await {
        Ok(label) => {
            stream
                .write_all(label.as_bytes())
                .await
                .map_err(|e| Error::Protocol(format!("control reply failed: {e}")))?;
            Ok(())
        }
        Err(e @ (Error::Protocol(_) | Error::DataUnavailable { .. })) => {
            let _ = stream.write_all(format!("ERR {e}").as_bytes()).await;
            Ok(())
        }
        Err(e) => {
            // persistence or bus trouble: tell the operator, then surface it
            let _ = stream.write_all(format!("ERR {e}").as_bytes()).await;
            Err(e)
        }
    }
}

async fn process<S>(
    stream: &mut S,
    interrupt: &InterruptController,
    state: &SharedState,
) -> Result<&'static str>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut opcode = [0u8; 1];
    timed(stream.read_exact(&mut opcode)).await?;

    match opcode[0] {
        b'1' => Ok(state.lock().current_event),
        b'c' => {
            let mut payload = [0u8; COLOR_PAYLOAD_LEN];
            timed(stream.read_exact(&mut payload)).await?;
            let mut raw = vec![b'c'];
            raw.extend_from_slice(&payload);
            interrupt.fire(InterruptSignal::parse(&raw)?).await
        }
        b'v' => {
            let mut raw = vec![b'v'];
            // the client closes its write side when the pattern is complete
            timed(stream.take(MAX_PATTERN_PAYLOAD).read_to_end(&mut raw)).await?;
            interrupt.fire(InterruptSignal::parse(&raw)?).await
        }
        token => interrupt.fire(InterruptSignal::parse(&[token])?).await,
    }
}

async fn timed<T>(read: impl Future<Output = std::io::Result<T>>) -> Result<T> {
    match timeout(READ_TIMEOUT, read).await {
        Err(_) => Err(Error::Protocol("control read timed out".into())),
        Ok(Err(e)) => Err(Error::Protocol(format!("control read failed: {e}"))),
        Ok(Ok(value)) => Ok(value),
    }
}
