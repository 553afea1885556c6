//! Logout Request
//!
//! Tells the account server that this machine signs out. The request is
//! retried a bounded number of times when no response is obtained; the
//! listener hears exactly one terminal outcome, on the control thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use sha2::{Digest, Sha256};
use tracing::debug;

use super::transport::LogoutTransport;
use crate::config::NetworkConfig;
use crate::control::ControlPoster;
use crate::error::{Result, TrackError};

const DEVICE_ID_PARAM: &str = "deviceId";
const CLIENT_CHECK_PARAM: &str = "clientCheck";
const HTTP_OK: u16 = 200;

/// Receives the outcome of a logout request.
pub trait LogoutListener: Send {
    fn on_success(&mut self);

    fn on_rejected(&mut self);

    fn on_connection_failed(&mut self);
}

/// Terminal outcome of a logout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    Ok,
    Rejected,
    ConnectionFailed,
}

impl LogoutOutcome {
    pub fn deliver(self, listener: &mut dyn LogoutListener) {
        match self {
            LogoutOutcome::Ok => listener.on_success(),
            LogoutOutcome::Rejected => listener.on_rejected(),
            LogoutOutcome::ConnectionFailed => listener.on_connection_failed(),
        }
    }
}

impl fmt::Display for LogoutOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogoutOutcome::Ok => write!(f, "Logged out"),
            LogoutOutcome::Rejected => write!(f, "Logout rejected"),
            LogoutOutcome::ConnectionFailed => write!(f, "Connection failed"),
        }
    }
}

/// Hex SHA-256 of the machine id with the salt appended.
pub fn client_check(machine_id: &str, salt: &str) -> String {
    let hash = Sha256::digest(format!("{}{}", machine_id, salt).as_bytes());
    format!("{:x}", hash)
}

/// Runs logout requests on a background thread.
pub struct LogoutWorker {
    config: NetworkConfig,
    transport: Arc<dyn LogoutTransport>,
    running: Arc<AtomicBool>,
}

impl LogoutWorker {
    pub fn new(config: NetworkConfig, transport: Arc<dyn LogoutTransport>) -> Self {
        Self {
            config,
            transport,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Perform the request on the calling thread.
    pub fn run(&self) -> LogoutOutcome {
        attempt_logout(&self.config, self.transport.as_ref())
    }

    /// Start the request on a worker thread.
    ///
    /// The outcome is posted once to `poster`; `listener` is invoked when the
    /// control thread pumps its queue. Fails if a request is already running.
    pub fn logout<C: 'static>(
        &self,
        listener: Box<dyn LogoutListener>,
        poster: ControlPoster<C>,
    ) -> Result<JoinHandle<()>> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(TrackError::Internal(
                "logout already in progress".to_string(),
            ));
        }

        let config = self.config.clone();
        let transport = Arc::clone(&self.transport);
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name("logout".to_string())
            .spawn(move || {
                let outcome = attempt_logout(&config, transport.as_ref());
                running.store(false, Ordering::Release);

                let mut listener = listener;
                if !poster.post(move |_: &mut C| outcome.deliver(listener.as_mut())) {
                    debug!(%outcome, "control queue closed, logout outcome dropped");
                }
            });

        spawned.map_err(|e| {
            self.running.store(false, Ordering::Release);
            TrackError::Io(e)
        })
    }
}

fn attempt_logout(config: &NetworkConfig, transport: &dyn LogoutTransport) -> LogoutOutcome {
    let device_id = config.machine_id.as_str().to_string();
    let check = client_check(&device_id, &config.salt);
    let query = [
        (DEVICE_ID_PARAM, device_id),
        (CLIENT_CHECK_PARAM, check),
    ];

    for attempt in 1..=config.attempts {
        match transport.get(&config.logout_url, &query) {
            Err(e) => {
                debug!(attempt, "logout request got no response: {}", e);
                continue;
            }
            Ok(response) if response.status != HTTP_OK => {
                debug!(attempt, status = response.status, "logout rejected");
                return LogoutOutcome::Rejected;
            }
            Ok(_) => return LogoutOutcome::Ok,
        }
    }

    LogoutOutcome::ConnectionFailed
}
