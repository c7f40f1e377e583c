//! TCP dialing and listening.

use crate::TransportConfig;
use crate::packet::PacketStream;
use crate::transport::{TransportError, TransportResult};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Dial `addr` and wrap the connection as a packet stream
///
/// # Errors
///
/// Returns `TransportError::ConnectionFailed` if the address cannot be
/// resolved or the connection is refused.
pub async fn connect(
    addr: &str,
    config: &TransportConfig,
) -> TransportResult<PacketStream<TcpStream>> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::ConnectionFailed {
            addr: addr.to_string(),
            source,
        })?;
    stream.set_nodelay(config.nodelay)?;

    tracing::debug!("Connected to {}", addr);
    Ok(PacketStream::with_max_packet_size(
        stream,
        config.max_packet_size,
    ))
}

/// TCP listener producing packet streams
pub struct PacketListener {
    listener: TcpListener,
    config: TransportConfig,
}

impl PacketListener {
    /// Bind a listener to `addr` (use port 0 for automatic port selection)
    ///
    /// # Errors
    ///
    /// Returns `TransportError::BindFailed` if the address is unavailable.
    pub async fn bind(addr: &str, config: TransportConfig) -> TransportResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self { listener, config })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the next incoming connection
    pub async fn accept(&self) -> TransportResult<(PacketStream<TcpStream>, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(self.config.nodelay)?;

        Ok((
            PacketStream::with_max_packet_size(stream, self.config.max_packet_size),
            peer,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let listener = PacketListener::bind("127.0.0.1:0", TransportConfig::default())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _peer) = listener.accept().await.unwrap();
            let request = stream.recv().await.unwrap().unwrap();
            stream.send(&request).await.unwrap();
            assert!(stream.recv().await.unwrap().is_none());
        });

        let mut client = connect(&addr, &TransportConfig::default()).await.unwrap();
        client.send(b"echo").await.unwrap();
        client.finish().await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), &b"echo"[..]);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to obtain a port with nothing listening
        let listener = PacketListener::bind("127.0.0.1:0", TransportConfig::default())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(matches!(
            connect(&addr, &TransportConfig::default()).await,
            Err(TransportError::ConnectionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        assert!(matches!(
            PacketListener::bind("not-an-address", TransportConfig::default()).await,
            Err(TransportError::BindFailed { .. })
        ));
    }
}
