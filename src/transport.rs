use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_std::future;
use async_std::net::UdpSocket;
use pnet::datalink;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, trace};

use super::error::*;

/// Fixed response timeout for every probe. A single timeout is a definitive
/// "unreachable along this path" signal to the classifier; there is no retry.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

const RECV_BUFFER_SIZE: usize = 4096;

/// One bounded request/response exchange over a fixed local endpoint.
///
/// The classifier only ever talks to this interface, so it can be driven by
/// a scripted fake in tests.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// The endpoint this transport is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Sends `request` to `target` and waits for a single datagram.
    /// `Ok(None)` means the response timeout elapsed; that is a semantic
    /// signal, not an error.
    async fn exchange(
        &self,
        request: &[u8],
        target: SocketAddr,
    ) -> Result<Option<Vec<u8>>, STUNError>;
}

/// UDP transport bound to one local address for the lifetime of a discovery
/// session. The socket is released when the transport is dropped.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Binds with `SO_REUSEADDR`, so a fixed local port can be reused right
    /// after a previous session ends.
    pub fn bind(local_addr: SocketAddr) -> Result<UdpTransport, STUNError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .and_then(|socket| {
                socket.set_reuse_address(true)?;
                socket.set_nonblocking(true)?;
                socket.bind(&local_addr.into())?;
                Ok(socket)
            })
            .map_err(|source| STUNError::Bind {
                addr: local_addr,
                source,
            })?;

        let socket = UdpSocket::from(std::net::UdpSocket::from(socket));
        let local_addr = socket.local_addr()?;
        Ok(UdpTransport { socket, local_addr })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn exchange(
        &self,
        request: &[u8],
        target: SocketAddr,
    ) -> Result<Option<Vec<u8>>, STUNError> {
        self.socket.send_to(request, target).await?;

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        match future::timeout(RESPONSE_TIMEOUT, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => {
                trace!(%from, bytes = n, "datagram received");
                buf.truncate(n);
                Ok(Some(buf))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                debug!(%target, "receive timeout");
                Ok(None)
            }
        }
    }
}

/// Addresses assigned to local interfaces. Needed to recognize our own
/// mapped address when the socket is bound to a wildcard address.
pub(crate) fn interface_addresses() -> Vec<IpAddr> {
    datalink::interfaces()
        .iter()
        .flat_map(|i| i.ips.iter().map(|net| net.ip()))
        .collect()
}

#[cfg(test)]
mod tests {
    use async_std::task;

    use super::*;

    #[async_std::test]
    async fn exchange_round_trips_on_loopback() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        task::spawn(async move {
            let mut buf = [0u8; 64];
            let (n, peer) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&buf[..n], peer).await.unwrap();
        });

        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let reply = transport.exchange(b"ping", server_addr).await.unwrap();
        assert_eq!(reply.as_deref(), Some(&b"ping"[..]));
    }

    #[async_std::test]
    async fn exchange_times_out_without_a_responder() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let silent_addr = silent.local_addr().unwrap();

        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let reply = transport.exchange(b"ping", silent_addr).await.unwrap();
        assert!(reply.is_none());
    }

    #[test]
    fn bound_address_is_reported() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert_eq!(transport.local_addr().ip(), "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_ne!(transport.local_addr().port(), 0);
    }
}
