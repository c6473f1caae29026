//! The two cooperative executors.
//!
//! All forwarder state is touched only by tasks running on the **main**
//! executor; all RIB state only by tasks on the **rib** executor. Each
//! executor drains its FIFO queue serially, so there is no intra-executor
//! parallelism and no locking beyond the queues themselves.

use crate::forwarder::Forwarder;
use crate::rib::RibService;
use log::trace;
use tokio::sync::mpsc;

/// A task for the main executor.
pub type MainTask = Box<dyn FnOnce(&mut Forwarder) + Send>;

/// A task for the rib executor.
pub type RibTask = Box<dyn FnOnce(&mut RibService) + Send>;

/// Cloneable handle for posting tasks to either executor.
#[derive(Clone)]
pub struct Executors {
    main_tx: mpsc::UnboundedSender<MainTask>,
    rib_tx: mpsc::UnboundedSender<RibTask>,
}

impl Executors {
    /// Create the handle together with the two task queues.
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<MainTask>,
        mpsc::UnboundedReceiver<RibTask>,
    ) {
        let (main_tx, main_rx) = mpsc::unbounded_channel();
        let (rib_tx, rib_rx) = mpsc::unbounded_channel();
        (Self { main_tx, rib_tx }, main_rx, rib_rx)
    }

    /// Post a task to the main executor's FIFO queue.
    pub fn run_on_main(&self, task: impl FnOnce(&mut Forwarder) + Send + 'static) {
        if self.main_tx.send(Box::new(task)).is_err() {
            trace!("main executor gone, task dropped");
        }
    }

    /// Post a task to the rib executor's FIFO queue.
    pub fn run_on_rib(&self, task: impl FnOnce(&mut RibService) + Send + 'static) {
        if self.rib_tx.send(Box::new(task)).is_err() {
            trace!("rib executor gone, task dropped");
        }
    }
}
