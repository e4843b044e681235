//! Forwarding of child stdout/stderr into the tracing pipeline.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn as_str(self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// Spawn a background task that logs each line the child writes.
pub(crate) fn spawn_output_logger<R>(service_name: String, stream: OutputStream, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(service = %service_name, stream = stream.as_str(), "{line}");
        }
    });
}
