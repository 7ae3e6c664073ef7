//! Command link to the host
//!
//! Bytes are pulled in by a background reader task so the scan loop can
//! check for input without blocking. Replies are written directly.
//!
//! The reader survives transient read errors: it reports the error, backs
//! off and keeps reading. Only end-of-stream stops it.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use fixture_core::{FixtureError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, warn};

const READ_CHUNK: usize = 256;

/// First wait after a read error; doubles up to [`RETRY_MAX_DELAY`]
const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Byte-level transport the dispatcher reads commands from and replies on
#[async_trait]
pub trait SerialLink: Send {
    /// Everything received since the last call; empty if nothing arrived
    fn read_available(&mut self) -> Result<Vec<u8>>;

    /// Write `data` and flush
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Human-readable endpoint name for logs
    fn name(&self) -> &str;
}

type Chunk = io::Result<Vec<u8>>;

/// A [`SerialLink`] over any async byte stream pair
pub struct SerialDriver {
    name: String,
    rx: mpsc::UnboundedReceiver<Chunk>,
    /// Read error held back so the bytes before it could be returned first
    pending_error: Option<io::Error>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    reader_task: JoinHandle<()>,
    debug_uart: bool,
}

impl SerialDriver {
    /// Open a serial port at 8N1 without flow control.
    pub fn open(port_path: &str, baud_rate: u32, debug_uart: bool) -> Result<Self> {
        debug!("Opening serial port: {}", port_path);

        let port = tokio_serial::new(port_path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", port_path, e);
                FixtureError::Serial(format!("Failed to open serial port: {}", e))
            })?;

        debug!("Serial port opened at {} baud", baud_rate);
        if debug_uart {
            debug!("UART debug logging enabled");
        }

        let (reader, writer) = tokio::io::split(port);
        Ok(Self::from_io(port_path, reader, writer, debug_uart))
    }

    /// Use the process's stdin and stdout as the link
    pub fn stdio(debug_uart: bool) -> Self {
        Self::from_io("stdio", tokio::io::stdin(), tokio::io::stdout(), debug_uart)
    }

    /// Build a link from a reader and writer. Must be called inside a
    /// tokio runtime.
    pub fn from_io<R, W>(name: &str, reader: R, writer: W, debug_uart: bool) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_loop(name.to_string(), reader, tx));
        Self {
            name: name.to_string(),
            rx,
            pending_error: None,
            writer: Box::new(writer),
            reader_task,
            debug_uart,
        }
    }
}

async fn read_loop<R>(name: String, mut reader: R, tx: mpsc::UnboundedSender<Chunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    let mut delay = RETRY_INITIAL_DELAY;
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                warn!("{} returned EOF, no further commands will arrive", name);
                break;
            }
            Ok(n) => {
                delay = RETRY_INITIAL_DELAY;
                if tx.send(Ok(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Read error on {}: {}, retrying in {:?}", name, e, delay);
                if tx.send(Err(e)).is_err() {
                    break;
                }
                sleep(delay).await;
                delay = (delay * 2).min(RETRY_MAX_DELAY);
            }
        }
    }
}

impl SerialDriver {
    fn read_error(&self, err: io::Error) -> FixtureError {
        error!("Read error on {}: {}", self.name, err);
        FixtureError::Serial(format!("Read error: {}", err))
    }
}

#[async_trait]
impl SerialLink for SerialDriver {
    fn read_available(&mut self) -> Result<Vec<u8>> {
        if let Some(e) = self.pending_error.take() {
            return Err(self.read_error(e));
        }

        let mut bytes = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(Ok(chunk)) => bytes.extend_from_slice(&chunk),
                Ok(Err(e)) if bytes.is_empty() => return Err(self.read_error(e)),
                Ok(Err(e)) => {
                    self.pending_error = Some(e);
                    break;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if self.debug_uart && !bytes.is_empty() {
            debug!("RX: {:?}", String::from_utf8_lossy(&bytes));
        }
        Ok(bytes)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.debug_uart {
            debug!("TX: {:?}", String::from_utf8_lossy(data));
        }
        self.writer
            .write_all(data)
            .await
            .map_err(|e| FixtureError::Serial(format!("Write failed: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| FixtureError::Serial(format!("Flush failed: {}", e)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SerialDriver {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    async fn read_until_newline(link: &mut SerialDriver) -> Vec<u8> {
        let mut received = Vec::new();
        for _ in 0..100 {
            received.extend(link.read_available().unwrap());
            if received.contains(&b'\n') {
                break;
            }
            tokio::task::yield_now().await;
        }
        received
    }

    #[tokio::test]
    async fn test_bytes_arrive_without_blocking() {
        let (mut host, device) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(device);
        let mut link = SerialDriver::from_io("duplex", reader, writer, true);

        assert!(link.read_available().unwrap().is_empty());

        host.write_all(b"fixture_in\n").await.unwrap();
        assert_eq!(read_until_newline(&mut link).await, b"fixture_in\n");
        assert!(link.read_available().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_reaches_host() {
        let (mut host, device) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(device);
        let mut link = SerialDriver::from_io("duplex", reader, writer, false);

        link.write_all(b"fixture_in [OK]\n").await.unwrap();

        let mut buf = [0u8; 16];
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"fixture_in [OK]\n");
        assert_eq!(link.name(), "duplex");
    }

    /// Reader that replays a fixed script of reads, then reports EOF
    struct ScriptedReader {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl AsyncRead for ScriptedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.steps.pop_front() {
                Some(Ok(bytes)) => {
                    buf.put_slice(&bytes);
                    Poll::Ready(Ok(()))
                }
                Some(Err(e)) => Poll::Ready(Err(e)),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    fn eio() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "EIO")
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_keeps_reading_after_an_error() {
        let reader = ScriptedReader::new(vec![
            Ok(b"fixture_in\n".to_vec()),
            Err(eio()),
            Ok(b"led_off\n".to_vec()),
        ]);
        let mut link = SerialDriver::from_io("scripted", reader, tokio::io::sink(), false);

        // Let the reader hit the error and sit out its back-off
        tokio::time::sleep(RETRY_INITIAL_DELAY * 2).await;

        assert_eq!(link.read_available().unwrap(), b"fixture_in\n");
        assert!(matches!(
            link.read_available(),
            Err(FixtureError::Serial(_))
        ));
        assert_eq!(link.read_available().unwrap(), b"led_off\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_before_any_bytes_is_reported_at_once() {
        let reader = ScriptedReader::new(vec![Err(eio()), Ok(b"get_status\n".to_vec())]);
        let mut link = SerialDriver::from_io("scripted", reader, tokio::io::sink(), false);

        tokio::time::sleep(RETRY_INITIAL_DELAY * 2).await;

        assert!(link.read_available().is_err());
        assert_eq!(link.read_available().unwrap(), b"get_status\n");
        assert!(link.read_available().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_off_grows_between_repeated_errors() {
        let reader = ScriptedReader::new(vec![Err(eio()), Err(eio()), Ok(b"x\n".to_vec())]);
        let mut link = SerialDriver::from_io("scripted", reader, tokio::io::sink(), false);

        // 100 ms after the first error, 200 ms after the second
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(link.read_available().is_err());
        assert!(link.read_available().is_err());
        assert!(link.read_available().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(link.read_available().unwrap(), b"x\n");
    }

    #[tokio::test]
    async fn test_eof_yields_empty_reads() {
        let (host, device) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(device);
        let mut link = SerialDriver::from_io("duplex", reader, writer, false);
        drop(host);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(link.read_available().unwrap().is_empty());
    }
}
