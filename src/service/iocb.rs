//! I/O control blocks: one outstanding request and its completion handle.
//!
//! ```rust,ignore
//! let (iocb, handle) = Iocb::new(request);
//! scheduler.request_io(iocb);
//! match handle.wait_timeout(Duration::from_secs(5)).await {
//!     Ok(Response::ReadAck(ack)) => println!("{}", ack.value),
//!     Ok(_) => {}
//!     Err(e) => println!("{e}"),
//! }
//! ```

use std::time::Duration;

use tokio::sync::oneshot;

use super::request::{Request, RequestError, Response};

/// Outcome delivered to a waiting handle.
pub type IoResult = Result<Response, RequestError>;

/// A request travelling to the event loop.
#[derive(Debug)]
pub struct Iocb {
    request: Request,
    completion: oneshot::Sender<IoResult>,
}

/// The waiting side of an [`Iocb`].
#[derive(Debug)]
pub struct IocbHandle {
    completion: oneshot::Receiver<IoResult>,
}

impl Iocb {
    pub fn new(request: Request) -> (Self, IocbHandle) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                request,
                completion: tx,
            },
            IocbHandle { completion: rx },
        )
    }

    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Resolve the handle. A waiter that gave up is ignored.
    pub fn complete(self, result: IoResult) {
        let _ = self.completion.send(result);
    }
}

impl IocbHandle {
    /// Wait for the request to complete.
    ///
    /// A request dropped without completion resolves to an abort.
    pub async fn wait(self) -> IoResult {
        self.completion
            .await
            .unwrap_or_else(|_| Err(RequestError::Abort("request dropped before completion".to_string())))
    }

    /// Wait at most `timeout`.
    pub async fn wait_timeout(self, timeout: Duration) -> IoResult {
        tokio::time::timeout(timeout, self.wait())
            .await
            .unwrap_or(Err(RequestError::Timeout))
    }
}
