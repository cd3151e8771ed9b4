//! Path validation (RFC 9000 §8.2) and single-path migration bookkeeping.
//! Multipath is explicitly out of scope; this tracks at most one
//! outstanding challenge for the current path.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::RngCore;

use crate::connection::error::TransportError;

struct Outstanding {
    data: [u8; 8],
    deadline: Instant,
}

/// Owns the one PATH_CHALLENGE this endpoint may have outstanding, and
/// which peer address is currently considered validated.
pub struct PathValidator {
    validated_addr: Option<SocketAddr>,
    outstanding: Option<Outstanding>,
}

impl PathValidator {
    pub fn new(initial_addr: SocketAddr) -> Self {
        Self { validated_addr: Some(initial_addr), outstanding: None }
    }

    pub fn is_validated(&self, addr: SocketAddr) -> bool {
        self.validated_addr == Some(addr)
    }

    /// Starts validating `addr`, returning the PATH_CHALLENGE payload to
    /// send. `pto` bounds how long the challenge is considered live.
    pub fn challenge(&mut self, rng: &mut dyn RngCore, now: Instant, pto: Duration) -> [u8; 8] {
        let mut data = [0u8; 8];
        rng.fill_bytes(&mut data);
        self.outstanding = Some(Outstanding { data, deadline: now + pto * 3 });
        data
    }

    /// Consumes a matching PATH_RESPONSE and marks `addr` validated.
    pub fn on_path_response(&mut self, data: [u8; 8], addr: SocketAddr) -> Result<(), TransportError> {
        match &self.outstanding {
            Some(o) if o.data == data => {
                self.outstanding = None;
                self.validated_addr = Some(addr);
                Ok(())
            }
            _ => Err(TransportError::UnsolicitedPathResponse),
        }
    }

    /// Reports and clears a challenge whose deadline has passed without a
    /// matching response.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.outstanding {
            Some(o) if now >= o.deadline => {
                self.outstanding = None;
                true
            }
            _ => false,
        }
    }

    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn addr(port: u16) -> SocketAddr {
        "127.0.0.1:0".parse::<SocketAddr>().map(|mut a| { a.set_port(port); a }).unwrap()
    }

    #[test]
    fn matching_response_validates_the_new_address() {
        let mut pv = PathValidator::new(addr(1));
        let mut rng = StepRng::new(1, 1);
        let now = Instant::now();
        let data = pv.challenge(&mut rng, now, Duration::from_millis(100));
        assert!(pv.on_path_response(data, addr(2)).is_ok());
        assert!(pv.is_validated(addr(2)));
    }

    #[test]
    fn mismatched_response_is_rejected() {
        let mut pv = PathValidator::new(addr(1));
        let mut rng = StepRng::new(1, 1);
        let now = Instant::now();
        pv.challenge(&mut rng, now, Duration::from_millis(100));
        assert!(pv.on_path_response([0xff; 8], addr(2)).is_err());
    }
}
