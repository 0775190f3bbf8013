/// Database readiness polling

pub mod cancel;
pub mod clock;

pub use cancel::CancellationToken;
pub use clock::{Clock, TokioClock};

use crate::config::ConnectionTarget;
use crate::error::{BootstrapError, Result};
use crate::log_step;
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self, target: &ConnectionTarget) -> io::Result<()>;
}

/// Succeeds once a TCP connection to the target can be opened.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(POLL_INTERVAL)
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn probe(&self, target: &ConnectionTarget) -> io::Result<()> {
        let address = target.address();
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(address.as_str())).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {} timed out", address),
            )),
        }
    }
}

/// Polls at a fixed interval with no attempt limit until the probe succeeds.
pub struct ReadinessWaiter<'a> {
    probe: &'a dyn ReadinessProbe,
    clock: &'a dyn Clock,
    interval: Duration,
}

impl<'a> ReadinessWaiter<'a> {
    pub fn new(probe: &'a dyn ReadinessProbe, clock: &'a dyn Clock) -> Self {
        Self {
            probe,
            clock,
            interval: POLL_INTERVAL,
        }
    }

    /// Returns the number of probe attempts it took to reach the target.
    pub async fn wait(&self, target: &ConnectionTarget, cancel: &CancellationToken) -> Result<u32> {
        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(BootstrapError::Cancelled { attempts });
            }

            attempts += 1;
            match self.probe.probe(target).await {
                Ok(()) => {
                    log_step!(info, "wait_db", address = %target.address(), attempts, "database is reachable");
                    return Ok(attempts);
                }
                Err(e) => {
                    log_step!(
                        info,
                        "wait_db",
                        address = %target.address(),
                        attempt = attempts,
                        error = %e,
                        "waiting for database"
                    );
                }
            }

            self.clock.sleep(self.interval).await;
        }
    }
}
