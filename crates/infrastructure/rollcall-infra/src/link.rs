//! TCP stand-in for the connection-oriented radio link.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use rollcall_core::radio::{BoxedLink, LinkConnector, LinkListener};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct TcpLinkConnector;

#[async_trait]
impl LinkConnector for TcpLinkConnector {
    async fn connect(&self, address: &str) -> io::Result<BoxedLink> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        debug!("Link open to {}", address);
        Ok(Box::new(stream))
    }
}

pub struct TcpLinkListener {
    listener: TcpListener,
}

impl TcpLinkListener {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl LinkListener for TcpLinkListener {
    async fn accept(&mut self) -> io::Result<(BoxedLink, String)> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((Box::new(stream), peer.to_string()))
    }
}
