//! Request handling: service values, completion handles, the per-node
//! application and the event loop that drives them.

mod application;
mod event_loop;
mod iocb;
mod request;

pub use application::DeviceApplication;
pub use event_loop::{DeferredTask, EventLoop, Scheduler};
pub use iocb::{IoResult, Iocb, IocbHandle};
pub use request::{ErrorClass, ErrorCode, IAm, ReadAck, Request, RequestError, Response};
