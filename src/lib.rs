//! RFC 3489 STUN codec and NAT type discovery.
//!
//! The classifier runs the classic discovery procedure (binding requests
//! with and without CHANGE-REQUEST, against the server's primary and
//! alternate addresses) and maps the outcomes to one of seven NAT types.
//!
//! ## Example
//!
//! ```no_run
//! use async_std::task;
//! use nat_probe::{NatType, Session};
//!
//! task::block_on(async {
//!     let local_addr = "0.0.0.0:54320".parse().unwrap();
//!     let session = Session::connect(local_addr, "stun.example.com:3478")
//!         .await
//!         .unwrap();
//!     match session.classify().await.unwrap() {
//!         NatType::Blocked => println!("no UDP connectivity"),
//!         nat_type => println!("nat type: {}", nat_type),
//!     }
//! });
//! ```

mod config;
mod error;
mod message;
mod nat_discovery;
mod transport;

pub use config::*;
pub use error::*;
pub use message::*;
pub use nat_discovery::*;
pub use transport::*;
