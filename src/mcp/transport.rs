//! Line-delimited stdio transport.
//!
//! One JSON-RPC message per line in, at most one response line out. Requests
//! are handled strictly in order. Lines that are not UTF-8 get a parse error
//! like any other malformed message.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, trace};

use crate::error::Result;
use crate::mcp::dispatcher::Dispatcher;

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Eof,
    WriteFailed,
    Interrupted,
}

/// Stdio-style transport over any buffered reader and writer.
pub struct StdioTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Serve until EOF or until the writer fails. The dispatcher is closed on return.
    pub async fn run(self, dispatcher: &Dispatcher) -> Result<StopReason> {
        self.run_until(dispatcher, std::future::pending()).await
    }

    /// Like [`run`](Self::run), also stopping when `shutdown` resolves.
    pub async fn run_until<S>(mut self, dispatcher: &Dispatcher, shutdown: S) -> Result<StopReason>
    where
        S: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut line = Vec::new();

        let reason = loop {
            line.clear();
            let read = tokio::select! {
                read = self.reader.read_until(b'\n', &mut line) => read,
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping stdio transport");
                    break StopReason::Interrupted;
                }
            };

            match read {
                Ok(0) => {
                    debug!("EOF on input, stopping transport");
                    break StopReason::Eof;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error reading input: {}", e);
                    break StopReason::Eof;
                }
            }

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            trace!("Received: {}", String::from_utf8_lossy(trimmed));

            let Some(out) = dispatcher.handle_bytes(trimmed).await else {
                continue;
            };
            trace!("Sending: {}", out);
            if let Err(e) = self.write_line(&out).await {
                error!("Error writing output: {}", e);
                break StopReason::WriteFailed;
            }
        };

        dispatcher.close();
        Ok(reason)
    }

    async fn write_line(&mut self, text: &str) -> std::io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

/// Serve the process's stdin and stdout until EOF or Ctrl-C.
pub async fn run_stdio(dispatcher: &Dispatcher) -> Result<StopReason> {
    let transport = StdioTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());
    transport
        .run_until(dispatcher, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}
