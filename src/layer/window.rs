//! Live-window fanout: every applied edit batch is pushed to each
//! registered window without ever blocking the writer. A consumer that
//! falls a full queue behind is dropped, its stream simply ends.

use log::warn;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    mpsc, Arc, Mutex,
};

use crate::types::NodeEdit;

/// Capacity of one live window queue.
pub const WINDOW_SIZE: usize = 10_000;

static WINDOW_IDS: AtomicU64 = AtomicU64::new(0);

pub(crate) struct WindowEnt {
    id: u64,
    tx: mpsc::SyncSender<(u64, Vec<NodeEdit>)>,
}

/// Receiving half of a live window, iterate it for `(offset, changes)`
/// batches. The window unregisters itself when dropped; the stream
/// ends when the layer closes or drops a slow consumer.
pub struct Window {
    id: u64,
    rx: mpsc::Receiver<(u64, Vec<NodeEdit>)>,
    registry: Arc<Mutex<Vec<WindowEnt>>>,
}

impl Drop for Window {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap();
        registry.retain(|ent| ent.id != self.id);
    }
}

impl Iterator for Window {
    type Item = (u64, Vec<NodeEdit>);

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

pub(crate) fn register(registry: &Arc<Mutex<Vec<WindowEnt>>>, size: usize) -> Window {
    let id = WINDOW_IDS.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = mpsc::sync_channel(size);

    registry.lock().unwrap().push(WindowEnt { id, tx });

    Window {
        id,
        rx,
        registry: Arc::clone(registry),
    }
}

pub(crate) fn push(
    registry: &Arc<Mutex<Vec<WindowEnt>>>,
    offs: u64,
    changes: &[NodeEdit],
) {
    let mut registry = registry.lock().unwrap();
    registry.retain(|ent| match ent.tx.try_send((offs, changes.to_vec())) {
        Ok(()) => true,
        Err(mpsc::TrySendError::Full(_)) => {
            warn!(target: "stratum", "dropping slow live-window consumer {}", ent.id);
            false
        }
        Err(mpsc::TrySendError::Disconnected(_)) => false,
    });
}
