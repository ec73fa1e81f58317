//! TCP liveness probe.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use super::Prober;
use crate::error::{Error, Result};
use crate::model::Host;

/// Considers a host reachable if a TCP connection to `port` opens in time.
pub struct TcpProber {
    port: u16,
    timeout: Duration,
}

impl TcpProber {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, host: &Host) -> Result<bool> {
        if host.host.is_empty() {
            return Err(Error::Other(format!("host {} has no DNS name", host.id)));
        }
        let addr = format!("{}:{}", host.host, self.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => {
                debug!(host_id = %host.id, %addr, error = %e, "probe connect failed");
                Ok(false)
            }
            Err(_) => {
                debug!(host_id = %host.id, %addr, "probe timed out");
                Ok(false)
            }
        }
    }
}
