use std::fmt;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec};

use crate::SessionError;

/// Control lines exchanged around the chunk frames.
///
/// ```text
/// receiver -> host   REQ
/// host -> receiver   NOLOGS | BEGIN <n>, <n> chunk lines, END
/// receiver -> host   ACK <records>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Request,
    NoLogs,
    Begin(usize),
    End,
    Ack(usize),
}

impl Control {
    pub fn parse(line: &str) -> Result<Self, SessionError> {
        let line = line.trim();
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb, Some(arg.trim())),
            None => (line, None),
        };
        let count = |arg: Option<&str>| -> Result<usize, SessionError> {
            arg.and_then(|a| a.parse().ok())
                .ok_or_else(|| SessionError::Protocol(format!("bad count in '{line}'")))
        };
        match verb {
            "REQ" => Ok(Control::Request),
            "NOLOGS" => Ok(Control::NoLogs),
            "BEGIN" => Ok(Control::Begin(count(arg)?)),
            "END" => Ok(Control::End),
            "ACK" => Ok(Control::Ack(count(arg)?)),
            _ => Err(SessionError::Protocol(format!("unexpected frame '{line}'"))),
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Request => f.write_str("REQ"),
            Control::NoLogs => f.write_str("NOLOGS"),
            Control::Begin(n) => write!(f, "BEGIN {n}"),
            Control::End => f.write_str("END"),
            Control::Ack(n) => write!(f, "ACK {n}"),
        }
    }
}

/// Newline-delimited text frames over a link stream, with a read deadline.
pub struct FrameStream<T> {
    inner: Framed<T, LinesCodec>,
    read_timeout: Duration,
}

impl<T: AsyncRead + AsyncWrite + Unpin> FrameStream<T> {
    pub fn new(stream: T, read_timeout: Duration) -> Self {
        Self {
            inner: Framed::new(
                stream,
                LinesCodec::new_with_max_length(rollcall_config::MAX_FRAME_LEN),
            ),
            read_timeout,
        }
    }

    pub async fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
        self.inner.send(line).await?;
        Ok(())
    }

    pub async fn send_control(&mut self, control: Control) -> Result<(), SessionError> {
        self.send_line(&control.to_string()).await
    }

    pub async fn read_line(&mut self) -> Result<String, SessionError> {
        match tokio::time::timeout(self.read_timeout, self.inner.next()).await {
            Err(_) => Err(SessionError::Timeout(self.read_timeout)),
            Ok(None) => Err(SessionError::Closed),
            Ok(Some(line)) => Ok(line?),
        }
    }

    pub async fn read_control(&mut self) -> Result<Control, SessionError> {
        Control::parse(&self.read_line().await?)
    }

    /// Flushes pending frames and shuts the write half down.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        SinkExt::<&str>::close(&mut self.inner).await?;
        Ok(())
    }
}
