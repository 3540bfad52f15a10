//! Worker-side print client.
//!
//! A worker owns one column on the hub and writes binary pipe frames to it.
//! Output belonging to one unit of work goes through a [`PrintGroup`], which
//! opens a fresh group on the viewer and closes it when done.

use printwall_core::pipe::{encode_pipe_frame, PipeCommand, PipeFrame};
use printwall_core::GroupToken;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::warn;

pub struct PrintClient<W = TcpStream> {
    writer: W,
    col_idx: u16,
}

impl PrintClient<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs, col_idx: u16) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_writer(stream, col_idx))
    }

    /// Keeps retrying with backoff until the hub accepts or `attempts` runs
    /// out.
    pub async fn connect_with_retry(
        addr: &str,
        col_idx: u16,
        attempts: usize,
    ) -> io::Result<Self> {
        let mut backoff = Duration::from_secs(1);
        let mut last_err = None;
        for attempt in 0..attempts.max(1) {
            match Self::connect(addr, col_idx).await {
                Ok(client) => return Ok(client),
                Err(err) => {
                    warn!("pipe_connect_error: attempt={attempt} addr={addr} err={err}");
                    last_err = Some(err);
                }
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
        Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no attempts")))
    }
}

impl<W: AsyncWrite + Unpin> PrintClient<W> {
    pub fn from_writer(writer: W, col_idx: u16) -> Self {
        Self { writer, col_idx }
    }

    pub fn col_idx(&self) -> u16 {
        self.col_idx
    }

    /// Prints straight into the worker's column.
    pub async fn print(&mut self, text: impl Into<String>) -> io::Result<()> {
        self.send(PipeCommand::Print, None, text.into()).await
    }

    /// Opens a new group with a random token.
    pub async fn group(&mut self) -> io::Result<PrintGroup<'_, W>> {
        let token = GroupToken::random();
        self.send(PipeCommand::OpenGroup, Some(token), String::new())
            .await?;
        Ok(PrintGroup {
            client: self,
            token,
        })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    async fn send(
        &mut self,
        cmd: PipeCommand,
        token: Option<GroupToken>,
        data: String,
    ) -> io::Result<()> {
        let frame = PipeFrame {
            cmd,
            col_idx: self.col_idx,
            special_id: token.map(|token| token.to_string()).unwrap_or_default(),
            data,
        };
        let encoded = encode_pipe_frame(&frame)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        self.writer.write_all(&encoded).await?;
        self.writer.flush().await
    }
}

/// Output scope for one unit of work. Call [`PrintGroup::close`] when the
/// work is done; dropping without closing leaves the group to eviction.
pub struct PrintGroup<'a, W = TcpStream> {
    client: &'a mut PrintClient<W>,
    token: GroupToken,
}

impl<W: AsyncWrite + Unpin> PrintGroup<'_, W> {
    pub fn token(&self) -> GroupToken {
        self.token
    }

    pub async fn print(&mut self, text: impl Into<String>) -> io::Result<()> {
        self.client
            .send(PipeCommand::Print, Some(self.token), text.into())
            .await
    }

    pub async fn close(self) -> io::Result<()> {
        self.client
            .send(PipeCommand::CloseGroup, Some(self.token), String::new())
            .await
    }
}

fn next_backoff(current: Duration) -> Duration {
    let next = current + current;
    if next > Duration::from_secs(10) {
        Duration::from_secs(10)
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printwall_core::pipe::PipeFrameDecoder;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn group_lifecycle_writes_open_print_close() {
        let (writer, mut reader) = tokio::io::duplex(64 * 1024);
        let mut client = PrintClient::from_writer(writer, 4);
        client.print("direct").await.expect("print");
        let token = {
            let mut group = client.group().await.expect("open group");
            group.print("inside").await.expect("group print");
            let token = group.token();
            group.close().await.expect("close group");
            token
        };
        drop(client);

        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.expect("read");
        let report = PipeFrameDecoder::new().push_chunk(&bytes);
        assert!(report.errors.is_empty());
        let frames = report.frames;
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|frame| frame.col_idx == 4));
        assert_eq!(frames[0].special_id, "0".repeat(32));
        assert_eq!(frames[0].data, "direct");
        assert_eq!(frames[1].cmd, PipeCommand::OpenGroup);
        assert_eq!(frames[2].special_id, token.to_string());
        assert_eq!(frames[2].data, "inside");
        assert_eq!(frames[3].cmd, PipeCommand::CloseGroup);
    }

    #[tokio::test]
    async fn connect_with_retry_reports_last_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        drop(listener);

        let result = PrintClient::connect_with_retry(&addr, 0, 1).await;
        assert!(result.is_err());
    }

    #[test]
    fn backoff_caps_at_ten_seconds() {
        assert_eq!(next_backoff(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(8)), Duration::from_secs(10));
    }
}
