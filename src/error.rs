use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum STUNError {
    #[error("truncated STUN datagram")]
    Truncated,
    #[error("unknown STUN message type: {0:#06x}")]
    UnknownMessageType(u16),
    #[error("attribute length {declared} exceeds the {remaining} remaining bytes")]
    LengthMismatch { declared: usize, remaining: usize },
    #[error("attribute not present in response: {0}")]
    AttributeNotPresent(&'static str),
    #[error("cannot bind to {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot resolve STUN server address: {0}")]
    Resolve(String),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}
