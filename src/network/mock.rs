//! Mock transport for unit testing.
//!
//! Records every call so tests can assert what the router did to the external
//! network, and can be told to fail binding or to answer forwarded requests.
//!
//! # Example
//!
//! ```rust,ignore
//! use bacreplay::network::mock::{MockTransport, TransportOp};
//!
//! let mock = MockTransport::new();
//! let handle = mock.clone();
//! let topology = VirtualNetworkTopology::build(&store, config, Box::new(mock))?;
//!
//! assert!(handle.is_bound());
//! handle.assert_operations(&[TransportOp::Bind { network: 10 }]);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, trace};

use super::address::Address;
use super::transport::{Binding, Transport};
use crate::error::{ReplayError, Result};
use crate::service::{IAm, Request, RequestError, Response};

/// Recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOp {
    Bind { network: u16 },
    Unbind,
    AnnounceRouter { networks: Vec<u16> },
    Forward { request: Request },
    WhoIs { destination: Address, range: Option<(u32, u32)> },
    IAm { i_am: IAm },
    Maintain,
}

#[derive(Debug, Default)]
struct MockState {
    bound: bool,
    fail_bind: bool,
    maintenance: Option<Duration>,
    binding: Option<Binding>,
    operations: Vec<TransportOp>,
    replies: VecDeque<std::result::Result<Response, RequestError>>,
}

/// Transport that records calls instead of touching the network.
///
/// Clones share state, so a test keeps one clone while the topology owns the
/// other.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose `bind` fails.
    pub fn failing_bind() -> Self {
        let mock = Self::new();
        mock.state().fail_bind = true;
        mock
    }

    /// Ask for upkeep every `period` while bound, whatever the binding mode.
    pub fn with_maintenance_interval(self, period: Duration) -> Self {
        self.state().maintenance = Some(period);
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queue the answer for the next forwarded request.
    pub fn push_reply(&self, reply: std::result::Result<Response, RequestError>) {
        self.state().replies.push_back(reply);
    }

    pub fn binding(&self) -> Option<Binding> {
        self.state().binding.clone()
    }

    /// All recorded calls, oldest first.
    pub fn operations(&self) -> Vec<TransportOp> {
        self.state().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Assert the exact sequence of recorded calls.
    ///
    /// # Panics
    ///
    /// Panics if the recorded calls differ from `expected`.
    pub fn assert_operations(&self, expected: &[TransportOp]) {
        let actual = self.operations();
        assert_eq!(
            actual, expected,
            "transport operations mismatch\n  expected: {expected:?}\n  actual: {actual:?}"
        );
    }

    fn record(&self, op: TransportOp) {
        trace!(?op, "Recording transport operation");
        self.state().operations.push(op);
    }
}

impl Transport for MockTransport {
    fn bind(&mut self, binding: &Binding) -> Result<()> {
        let mut state = self.state();
        if state.fail_bind {
            return Err(ReplayError::Transport(format!("cannot bind {}: mock failure", binding.local)));
        }
        if state.bound {
            return Err(ReplayError::Transport("transport is already bound".to_string()));
        }
        state.bound = true;
        state.binding = Some(binding.clone());
        state.operations.push(TransportOp::Bind {
            network: binding.network,
        });
        drop(state);

        debug!(local = %binding.local, "Mock transport bound");
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.state().bound
    }

    fn unbind(&mut self) {
        let mut state = self.state();
        if state.bound {
            state.bound = false;
            state.binding = None;
            state.operations.push(TransportOp::Unbind);
        }
    }

    fn announce_router(&mut self, networks: &[u16]) -> Result<()> {
        if !self.is_bound() {
            return Err(ReplayError::Transport("transport is not bound".to_string()));
        }
        self.record(TransportOp::AnnounceRouter {
            networks: networks.to_vec(),
        });
        Ok(())
    }

    fn forward(&mut self, request: &Request) -> std::result::Result<Response, RequestError> {
        self.record(TransportOp::Forward {
            request: request.clone(),
        });
        self.state()
            .replies
            .pop_front()
            .unwrap_or(Err(RequestError::Timeout))
    }

    fn who_is(&mut self, destination: &Address, range: Option<(u32, u32)>) -> Result<()> {
        self.record(TransportOp::WhoIs {
            destination: *destination,
            range,
        });
        Ok(())
    }

    fn i_am(&mut self, i_am: &IAm) -> Result<()> {
        self.record(TransportOp::IAm { i_am: i_am.clone() });
        Ok(())
    }

    fn maintenance_interval(&self) -> Option<Duration> {
        let state = self.state();
        let binding = state.binding.as_ref()?;
        state.maintenance.or_else(|| binding.mode.renewal_interval())
    }

    fn maintain(&mut self) -> Result<()> {
        if !self.is_bound() {
            return Err(ReplayError::Transport("transport is not bound".to_string()));
        }
        self.record(TransportOp::Maintain);
        Ok(())
    }
}
