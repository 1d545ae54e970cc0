//! Single-threaded cooperative event loop.
//!
//! The loop owns the topology. Everything that touches it arrives through two
//! queues on a [`Scheduler`]: deferred tasks, which always run first, and I/O
//! control blocks carrying requests. Each request resolves only its own
//! [`IocbHandle`](super::IocbHandle). Transport upkeep such as foreign device
//! re-registration runs on a timer between them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::iocb::{Iocb, IocbHandle};
use super::request::{IAm, Request, RequestError};
use crate::network::VirtualNetworkTopology;

/// Work run against the topology on the loop.
pub type DeferredTask = Box<dyn FnOnce(&mut VirtualNetworkTopology) + Send>;

/// Cloneable handle for queueing work onto the loop.
#[derive(Clone)]
pub struct Scheduler {
    deferred: mpsc::UnboundedSender<DeferredTask>,
    io: mpsc::UnboundedSender<Iocb>,
    shutdown: Arc<Notify>,
}

impl Scheduler {
    /// Queue `task` to run on the loop before any pending request. Returns
    /// false if the loop has stopped.
    pub fn deferred<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut VirtualNetworkTopology) + Send + 'static,
    {
        self.deferred.send(Box::new(task)).is_ok()
    }

    /// Queue a request. If the loop has stopped the request is aborted.
    pub fn request_io(&self, iocb: Iocb) {
        if let Err(mpsc::error::SendError(iocb)) = self.io.send(iocb) {
            iocb.complete(Err(RequestError::Abort("event loop stopped".to_string())));
        }
    }

    /// Wrap `request` in an IOCB, queue it and return its handle.
    pub fn request(&self, request: Request) -> IocbHandle {
        let (iocb, handle) = Iocb::new(request);
        self.request_io(iocb);
        handle
    }

    /// Ask the loop to stop after the work already queued.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

/// The loop itself.
pub struct EventLoop {
    topology: VirtualNetworkTopology,
    scheduler: Scheduler,
    deferred: mpsc::UnboundedReceiver<DeferredTask>,
    io: mpsc::UnboundedReceiver<Iocb>,
    indications: Option<mpsc::UnboundedSender<IAm>>,
    sleep: Option<Duration>,
    handle_signals: bool,
}

impl EventLoop {
    /// Take ownership of `topology` and queue the router announcement.
    pub fn new(topology: VirtualNetworkTopology) -> Self {
        let (deferred_tx, deferred) = mpsc::unbounded_channel();
        let (io_tx, io) = mpsc::unbounded_channel();
        let scheduler = Scheduler {
            deferred: deferred_tx,
            io: io_tx,
            shutdown: Arc::new(Notify::new()),
        };

        scheduler.deferred(|topology: &mut VirtualNetworkTopology| {
            if let Err(e) = topology.announce() {
                warn!(error = %e, "Router announcement failed");
            }
        });

        Self {
            topology,
            scheduler,
            deferred,
            io,
            indications: None,
            sleep: None,
            handle_signals: true,
        }
    }

    /// Pause between iterations so the loop yields the CPU.
    #[must_use]
    pub const fn with_sleep(mut self, sleep: Option<Duration>) -> Self {
        self.sleep = sleep;
        self
    }

    /// Stop on Ctrl-C (the default).
    #[must_use]
    pub const fn with_signals(mut self, handle_signals: bool) -> Self {
        self.handle_signals = handle_signals;
        self
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// Receive I-Am indications produced by requests. Replaces any earlier
    /// receiver.
    pub fn indications(&mut self) -> mpsc::UnboundedReceiver<IAm> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.indications = Some(tx);
        rx
    }

    /// Run until shutdown or Ctrl-C, then close the network and hand the
    /// topology back.
    pub async fn run(mut self) -> VirtualNetworkTopology {
        info!("Event loop running");
        let shutdown = Arc::clone(&self.scheduler.shutdown);
        let mut maintenance = self.topology.maintenance_interval().map(|period| {
            debug!(?period, "Transport upkeep scheduled");
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        loop {
            tokio::select! {
                biased;

                Some(task) = self.deferred.recv() => {
                    trace!("Running deferred task");
                    task(&mut self.topology);
                    self.publish_indications();
                }
                Some(iocb) = self.io.recv() => {
                    self.process(iocb);
                }
                () = next_tick(&mut maintenance) => {
                    trace!("Transport upkeep");
                    if let Err(e) = self.topology.maintain() {
                        warn!(error = %e, "Transport upkeep failed");
                    }
                }
                () = shutdown.notified() => {
                    debug!("Shutdown requested");
                    break;
                }
                result = tokio::signal::ctrl_c(), if self.handle_signals => {
                    if let Err(e) = result {
                        warn!(error = %e, "Cannot listen for Ctrl-C");
                        self.handle_signals = false;
                        continue;
                    }
                    info!("Interrupted");
                    break;
                }
            }

            match self.sleep {
                Some(sleep) => tokio::time::sleep(sleep).await,
                None => tokio::task::yield_now().await,
            }
        }

        // Nothing queued after shutdown will ever run.
        self.io.close();
        while let Ok(iocb) = self.io.try_recv() {
            iocb.complete(Err(RequestError::Abort("event loop stopped".to_string())));
        }

        self.topology.close();
        info!("Event loop stopped");
        self.topology
    }

    fn process(&mut self, iocb: Iocb) {
        let result = self.topology.request(iocb.request());
        match &result {
            Ok(response) => trace!(?response, "Request complete"),
            Err(e) => debug!(error = %e, "Request failed"),
        }
        // Indications go out first so a waiter sees them once its own
        // request resolves.
        self.publish_indications();
        iocb.complete(result);
    }

    fn publish_indications(&mut self) {
        for i_am in self.topology.take_indications() {
            debug!(%i_am, "I-Am received");
            if let Some(tx) = &self.indications {
                if tx.send(i_am).is_err() {
                    self.indications = None;
                    break;
                }
            }
        }
    }
}

/// Next tick of `timer`, or never.
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("topology", &self.topology)
            .field("sleep", &self.sleep)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::{MockTransport, TransportOp};
    use crate::network::{Address, BipMode, TopologyConfig};
    use crate::object::ObjectId;
    use crate::service::Response;
    use crate::store::SnapshotStore;
    use crate::value::PropertyValue;

    fn event_loop(ids: &[u32]) -> (EventLoop, MockTransport) {
        event_loop_with(ids, MockTransport::new())
    }

    fn event_loop_with(ids: &[u32], mock: MockTransport) -> (EventLoop, MockTransport) {
        let mut store = SnapshotStore::in_memory().unwrap();
        for id in ids {
            let objid = format!("device:{id}");
            store
                .set(&id.to_string(), &objid, "objectName", &PropertyValue::text(format!("Device {id}")))
                .unwrap();
            store
                .set(&id.to_string(), &objid, "vendorIdentifier", &PropertyValue::Unsigned(15))
                .unwrap();
        }
        let config = TopologyConfig {
            local_address: "10.0.0.1/24".parse().unwrap(),
            local_network: 1,
            vlan_network: 2,
            device_ids: ids.to_vec(),
            bip_mode: BipMode::Simple,
        };
        let topology = VirtualNetworkTopology::build(&store, config, Box::new(mock.clone())).unwrap();
        (EventLoop::new(topology).with_signals(false), mock)
    }

    #[tokio::test]
    async fn test_announces_before_first_request() {
        let (event_loop, mock) = event_loop(&[10, 11]);
        let scheduler = event_loop.scheduler();
        let task = tokio::spawn(event_loop.run());

        let response = scheduler
            .request(Request::ReadProperty {
                destination: Address::remote_mac(2, 2),
                object: ObjectId::device(11),
                property: "objectName".to_string(),
                index: None,
            })
            .wait()
            .await
            .unwrap();
        let Response::ReadAck(ack) = response else {
            panic!("expected a read ack");
        };
        assert_eq!(ack.value, PropertyValue::text("Device 11"));

        scheduler.shutdown();
        let topology = task.await.unwrap();
        assert!(!topology.is_bound());
        assert_eq!(
            mock.operations(),
            vec![
                TransportOp::Bind { network: 1 },
                TransportOp::AnnounceRouter { networks: vec![2] },
                TransportOp::Unbind,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_request_resolves_only_its_handle() {
        let (event_loop, _mock) = event_loop(&[10, 11]);
        let scheduler = event_loop.scheduler();
        let task = tokio::spawn(event_loop.run());

        let bad = scheduler.request(Request::ReadProperty {
            destination: Address::remote_mac(2, 9),
            object: ObjectId::device(11),
            property: "objectName".to_string(),
            index: None,
        });
        let good = scheduler.request(Request::ReadProperty {
            destination: Address::remote_mac(2, 2),
            object: ObjectId::device(11),
            property: "vendorIdentifier".to_string(),
            index: None,
        });

        assert!(matches!(bad.wait().await, Err(RequestError::Unreachable { .. })));
        assert!(matches!(good.wait().await, Ok(Response::ReadAck(_))));

        scheduler.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_indications_arrive_before_completion() {
        let (mut event_loop, _mock) = event_loop(&[10, 11, 12]);
        let mut indications = event_loop.indications();
        let scheduler = event_loop.scheduler();
        let task = tokio::spawn(event_loop.run());

        let response = scheduler
            .request(Request::WhoIs {
                destination: Address::RemoteBroadcast(2),
                range: None,
            })
            .wait()
            .await;
        assert_eq!(response, Ok(Response::Sent));

        let first = indications.try_recv().unwrap();
        let second = indications.try_recv().unwrap();
        assert_eq!(first.device, ObjectId::device(11));
        assert_eq!(second.device, ObjectId::device(12));
        assert!(indications.try_recv().is_err());

        scheduler.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_deferred_task_runs_on_loop() {
        let (event_loop, _mock) = event_loop(&[10]);
        let scheduler = event_loop.scheduler();
        let task = tokio::spawn(event_loop.run());

        let (tx, rx) = tokio::sync::oneshot::channel();
        assert!(scheduler.deferred(move |topology: &mut VirtualNetworkTopology| {
            let _ = tx.send(topology.router().device_id());
        }));
        assert_eq!(rx.await.unwrap(), 10);

        scheduler.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_requests_after_stop_abort() {
        let (event_loop, _mock) = event_loop(&[10]);
        let scheduler = event_loop.scheduler();
        scheduler.shutdown();
        let _topology = event_loop.run().await;

        let result = scheduler
            .request(Request::IAm {
                destination: Address::GlobalBroadcast,
            })
            .wait()
            .await;
        assert!(matches!(result, Err(RequestError::Abort(_))));
    }

    #[tokio::test]
    async fn test_transport_upkeep_runs_on_timer() {
        let mock = MockTransport::new().with_maintenance_interval(Duration::from_millis(20));
        let (event_loop, mock) = event_loop_with(&[10], mock);
        let scheduler = event_loop.scheduler();
        let task = tokio::spawn(event_loop.run());

        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.shutdown();
        task.await.unwrap();

        let ops = mock.operations();
        let upkeep = ops.iter().filter(|op| **op == TransportOp::Maintain).count();
        assert!(upkeep >= 2, "expected repeated upkeep, got {ops:?}");
        assert_eq!(ops.last(), Some(&TransportOp::Unbind));
    }
}
