use std::fmt;
use std::net::{IpAddr, SocketAddr, SocketAddrV4};

use async_std::net::ToSocketAddrs;
use tracing::{debug, info};

use super::error::*;
use super::message::*;
use super::transport::*;

/// RFC 3489 NAT classification. `Blocked` doubles as the "nothing
/// determined" default.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NatType {
    #[default]
    Blocked,
    Wan,
    SymmetricFirewall,
    FullCone,
    AddrRestrictedCone,
    PortRestrictedCone,
    Symmetric,
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Blocked => "blocked",
            Self::Wan => "wan_address",
            Self::SymmetricFirewall => "symmetric_firewall",
            Self::FullCone => "full_cone",
            Self::AddrRestrictedCone => "addr_restricted_cone",
            Self::PortRestrictedCone => "port_restricted_cone",
            Self::Symmetric => "symmetric",
        };
        f.write_str(name)
    }
}

/// Runs the RFC 3489 discovery procedure against one server and returns
/// exactly one classification.
///
/// Test I is a plain binding request to the primary address; Test II asks
/// the server to reply from its alternate IP and port; Test III asks for a
/// port-only change. Test I is repeated against the server's CHANGED-ADDRESS
/// to tell symmetric NATs from restricted cones.
pub async fn classify<T: Transport>(
    transport: &T,
    server: SocketAddr,
) -> Result<NatType, STUNError> {
    // Test I
    let resp = match probe(transport, server, "test1", vec![]).await? {
        Some(resp) => resp,
        None => return Ok(NatType::Blocked),
    };
    let mapped = address_attribute(&resp, AttributeType::MappedAddress, "MAPPED-ADDRESS")?;
    let changed = address_attribute(&resp, AttributeType::ChangedAddress, "CHANGED-ADDRESS")?;
    let behind_nat = !is_own_address(mapped, transport.local_addr());

    // Test II
    let attrs = vec![Attribute::change_request(true, true)];
    let resp = probe(transport, server, "test2", attrs).await?;
    if !behind_nat {
        return Ok(match resp {
            Some(_) => NatType::Wan,
            None => NatType::SymmetricFirewall,
        });
    }
    if resp.is_some() {
        return Ok(NatType::FullCone);
    }

    // Test I against the server's alternate address. No response here is
    // still reported as blocked, matching the reference procedure, even
    // though the primary probe already succeeded.
    let resp = match probe(transport, SocketAddr::V4(changed), "test1-changed", vec![]).await? {
        Some(resp) => resp,
        None => return Ok(NatType::Blocked),
    };
    let remapped = address_attribute(&resp, AttributeType::MappedAddress, "MAPPED-ADDRESS")?;
    if remapped != mapped {
        return Ok(NatType::Symmetric);
    }

    // Test III
    let attrs = vec![Attribute::change_request(false, true)];
    match probe(transport, server, "test3", attrs).await? {
        Some(_) => Ok(NatType::AddrRestrictedCone),
        None => Ok(NatType::PortRestrictedCone),
    }
}

/// One probe: fresh binding request with a new random transaction id, one
/// exchange, decoded response or `None` on timeout.
async fn probe<T: Transport>(
    transport: &T,
    target: SocketAddr,
    kind: &'static str,
    attributes: Vec<Attribute>,
) -> Result<Option<Message>, STUNError> {
    let request = Message::binding_request(attributes);
    let raw = match transport.exchange(&request.to_raw(), target).await? {
        Some(raw) => raw,
        None => {
            debug!(%target, kind, outcome = "timeout", "probe finished");
            return Ok(None);
        }
    };

    let response = Message::from_raw(&raw)?;
    debug!(%target, kind, outcome = "response", response = %response, "probe finished");
    Ok(Some(response))
}

fn address_attribute(
    response: &Message,
    attr_type: AttributeType,
    name: &'static str,
) -> Result<SocketAddrV4, STUNError> {
    response
        .get(attr_type)
        .and_then(Attribute::address)
        .ok_or(STUNError::AttributeNotPresent(name))
}

/// Whether the server-observed mapping is this host's own endpoint, which
/// means no address translation is happening. When the socket is bound to a
/// wildcard address the mapped IP is checked against every local interface.
fn is_own_address(mapped: SocketAddrV4, local: SocketAddr) -> bool {
    if mapped.port() != local.port() {
        return false;
    }
    let mapped_ip = IpAddr::V4(*mapped.ip());
    match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => interface_addresses().contains(&mapped_ip),
        ip => ip == mapped_ip,
    }
}

/// One discovery session: a UDP transport bound for its whole lifetime and
/// the resolved address of one STUN server. The socket is released when the
/// session is dropped, on every exit path.
pub struct Session {
    transport: UdpTransport,
    server: SocketAddr,
}

impl Session {
    /// Resolves `server` ("host:port") and binds the local endpoint.
    pub async fn connect(local_addr: SocketAddr, server: &str) -> Result<Session, STUNError> {
        let server_addr = server
            .to_socket_addrs()
            .await?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| STUNError::Resolve(server.to_string()))?;
        let transport = UdpTransport::bind(local_addr)?;

        info!(server, %server_addr, local = %transport.local_addr(), "session open");
        Ok(Session {
            transport,
            server: server_addr,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    pub async fn classify(&self) -> Result<NatType, STUNError> {
        classify(&self.transport, self.server).await
    }
}
