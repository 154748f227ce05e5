// Line-oriented sample producers
//
// A device writes one ASCII float per line. Each parsed value is stamped
// with the session clock and handed to `PipelineCoordinator::enqueue`.
// Lines that do not parse are dropped without surfacing an error, as are
// lines longer than `MAX_LINE_BYTES`.

use crate::streaming::coordinator::PipelineCoordinator;
use crate::streaming::types::{Channel, StreamError, StreamResult};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest accepted device line, terminator included
pub const MAX_LINE_BYTES: usize = 64;

/// Parse one device line. Surrounding whitespace and `\r` are ignored.
pub fn parse_sample_line(line: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read newline-delimited values from `reader` until EOF or cancellation.
///
/// Returns the number of samples enqueued.
pub async fn read_samples<R>(
    reader: R,
    channel: Channel,
    coordinator: Arc<PipelineCoordinator>,
    cancel: CancellationToken,
) -> StreamResult<u64>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::with_capacity(MAX_LINE_BYTES);
    let mut count = 0u64;
    // inside an oversized line until the next newline
    let mut discarding = false;

    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
        let read = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            read = limited.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => {
                warn!("{} source reached end of stream", channel);
                break;
            }
            Ok(_) if discarding => {
                discarding = !line.ends_with(b"\n");
            }
            Ok(n) if n >= MAX_LINE_BYTES && !line.ends_with(b"\n") => {
                debug!("Dropping oversized {} line", channel);
                discarding = true;
            }
            Ok(_) => match parse_sample_line(&line) {
                Some(value) => {
                    coordinator.enqueue(channel, coordinator.elapsed(), value);
                    count += 1;
                }
                None => debug!("Dropping malformed {} line: {:?}", channel, String::from_utf8_lossy(&line)),
            },
            Err(e) => return Err(StreamError::Io(e)),
        }
    }

    Ok(count)
}

fn open_serial(port: &str, baud_rate: u32) -> StreamResult<tokio_serial::SerialStream> {
    tokio_serial::new(port, baud_rate)
        .open_native_async()
        .map_err(|e| StreamError::Serial(format!("Failed to open port {}: {}", port, e)))
}

/// Open a serial device and feed its lines into `coordinator`.
///
/// An unavailable port is logged and the producer exits; the session keeps
/// running without that channel.
pub fn spawn_serial_reader(
    port: String,
    baud_rate: u32,
    channel: Channel,
    coordinator: Arc<PipelineCoordinator>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stream = match open_serial(&port, baud_rate) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Cannot open {} source: {}", channel, e);
                return;
            }
        };
        info!("Opened serial port {} ({}) at {} baud", port, channel, baud_rate);

        match read_samples(stream, channel, coordinator, cancel).await {
            Ok(count) => info!("Closed serial port {} ({}), {} sample(s)", port, channel, count),
            Err(e) => error!("Serial read error on {} ({}): {}", port, channel, e),
        }
    })
}
