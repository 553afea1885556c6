//! Network collaborators
//!
//! Blocking requests run on dedicated worker threads and report their single
//! terminal outcome back through the control queue.

mod logout;
mod transport;

pub use logout::{client_check, LogoutListener, LogoutOutcome, LogoutWorker};
pub use transport::{HttpTransport, LogoutTransport, TransportResponse};
