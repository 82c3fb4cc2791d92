//! Zeroconf (mDNS / DNS-SD) announce and discovery sessions.
//!
//! A [`ServiceSession`] advertises this process under a service type and
//! discovers other instances of it, over whichever backend is available:
//! the `mdns-sd` multicast responder, an in-process [`LoopbackRegistry`], or
//! nothing at all, in which case operations answer [`Status::NOT_SUPPORTED`]
//! instead of failing hard.
//!
//! ```no_run
//! use beacon::{Interfaces, ServiceSession};
//!
//! # fn main() -> Result<(), beacon::SessionError> {
//! let mut session = ServiceSession::new("_test._tcp")?;
//! session.set("role", "leader");
//! if session.announce(4000, "node-1").is_success() {
//!     for instance in session.discover(Interfaces::All, 1000) {
//!         println!("{instance}: role={}", session.get_for(&instance, "role"));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod attributes;
pub mod config;
pub mod error;
pub mod instances;
pub mod listener;
pub mod session;
pub mod status;
pub mod watch;

pub use adapter::{BackendAdapter, BackendKind, Interfaces, LoopbackRegistry};
pub use attributes::Attributes;
pub use config::Config;
pub use error::{BackendError, SessionError};
pub use listener::{Listener, ListenerId};
pub use session::ServiceSession;
pub use shared::types::InstanceEntry;
pub use status::Status;
