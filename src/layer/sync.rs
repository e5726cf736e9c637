//! Upstream synchronization: follow one or more peer layers, pulling
//! their edit history and live edits into this layer.
//!
//! The peer is anything implementing [Upstream]; an in-process
//! implementation for `Arc<Layer>` ships below. Dialing remote peers is
//! the embedding service's job.

use log::{error, info};

use std::{sync::mpsc, thread, time};

use crate::{
    layer::{Layer, Window},
    seqn::SeqnIter,
    types::{EditMeta, LogEntry, NodeEdit},
    Result,
};

// size of the funnel between the peer reader and the apply loop.
const SYNC_QUEUE: usize = 1000;
// how long the apply loop waits before re-checking for shutdown.
const POLL_INTERVAL: time::Duration = time::Duration::from_millis(100);
// back-off after an upstream failure.
const RETRY_DELAY: time::Duration = time::Duration::from_secs(1);

/// A peer layer this layer can follow.
pub trait Upstream: Send {
    /// Peer identity, keys the local replication offset.
    fn get_iden(&self) -> Result<String>;

    /// Peer's next sequence-log offset.
    fn get_node_edit_offset(&self) -> Result<u64>;

    /// The peer's full current state as synthetic node-edits.
    fn iter_layer_node_edits(&self) -> Result<Vec<NodeEdit>>;

    /// Stream `(offset, changes)` from the peer's log, switching to
    /// live edits once caught up.
    fn sync_node_edits(
        &self,
        offs: u64,
    ) -> Result<Box<dyn Iterator<Item = Result<(u64, Vec<NodeEdit>)>> + Send>>;
}

impl Upstream for std::sync::Arc<Layer> {
    fn get_iden(&self) -> Result<String> {
        Ok(Layer::get_iden(self))
    }

    fn get_node_edit_offset(&self) -> Result<u64> {
        Ok(Layer::get_node_edit_offset(self))
    }

    fn iter_layer_node_edits(&self) -> Result<Vec<NodeEdit>> {
        Layer::iter_layer_node_edits(self)
    }

    fn sync_node_edits(
        &self,
        offs: u64,
    ) -> Result<Box<dyn Iterator<Item = Result<(u64, Vec<NodeEdit>)>> + Send>> {
        Ok(Box::new(Layer::sync_node_edits(self, offs)?))
    }
}

impl Layer {
    /// Start following `peer`: bulk-seed when this layer has never seen
    /// it, then apply its live edits as they appear. The syncer runs
    /// until [Layer::close] and survives peer failures by retrying.
    pub fn init_upstream_sync(
        self: &std::sync::Arc<Self>,
        peer: Box<dyn Upstream>,
    ) -> Result<()> {
        let layr = std::sync::Arc::clone(self);
        let handle = thread::spawn(move || upstream_loop(layr, peer));
        self.register_syncer(handle);
        Ok(())
    }

    /// Stream `(offset, changes)` from this layer's log starting at
    /// `offs`; once caught up with storage, yield applied batches in
    /// realtime. The stream ends when the layer closes.
    pub fn sync_node_edits(&self, offs: u64) -> Result<SyncIter> {
        // register the live window first, then snapshot the log end;
        // whatever lands in between shows up in both and is discarded
        // from the window side.
        let wind = self.push_window();
        let upto = self.nodeeditlog.index();
        let hist = self.nodeeditlog.iter(offs);

        Ok(SyncIter {
            hist: Some(hist),
            wind,
            upto,
        })
    }
}

/// Iterator behind [Layer::sync_node_edits]: log history first, then
/// the live window.
pub struct SyncIter {
    hist: Option<SeqnIter<LogEntry>>,
    wind: Window,
    upto: u64,
}

impl Iterator for SyncIter {
    type Item = Result<(u64, Vec<NodeEdit>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(hist) = self.hist.as_mut() {
            for item in hist {
                match item {
                    Ok((offs, _)) if offs >= self.upto => break,
                    Ok((offs, entry)) => return Some(Ok((offs, entry.changes))),
                    Err(err) => return Some(Err(err)),
                }
            }
            self.hist = None;
        }

        loop {
            let (offs, changes) = self.wind.next()?;
            if offs < self.upto {
                continue; // already seen through the history phase
            }
            return Some(Ok((offs, changes)));
        }
    }
}

fn upstream_loop(layr: std::sync::Arc<Layer>, peer: Box<dyn Upstream>) {
    while !layr.is_finished() {
        match sync_with_peer(&layr, peer.as_ref()) {
            Ok(()) => (),
            Err(err) => error!(target: "stratum", "upstream sync: {}", err),
        }
        if layr.is_finished() {
            break;
        }
        thread::sleep(RETRY_DELAY);
    }
}

fn sync_with_peer(layr: &std::sync::Arc<Layer>, peer: &dyn Upstream) -> Result<()> {
    let iden = peer.get_iden()?;
    let mut offs = layr.offsets.get(&iden).unwrap_or(0).max(0) as u64;

    info!(
        target: "stratum",
        "layer {} upstream sync connected ({} offset={})",
        (**layr).get_iden(), iden, offs
    );

    if offs == 0 {
        // an empty follower treats the peer as a seed.
        let seed_offs = peer.get_node_edit_offset()?;
        for ne in peer.iter_layer_node_edits()? {
            if layr.is_finished() {
                return Ok(());
            }
            layr.stor_node_edits_no_lift(vec![ne], EditMeta::default())?;
        }
        layr.set_offset(&iden, seed_offs as i64)?;
        layr.wake_upstream_waits(&iden, seed_offs);
        offs = seed_offs;
    }

    loop {
        if layr.is_finished() {
            return Ok(());
        }

        let iter = peer.sync_node_edits(offs)?;

        // funnel the peer stream through a bounded queue so the apply
        // side can eat it in chunks.
        let (qtx, qrx) = mpsc::sync_channel(SYNC_QUEUE);
        let producer = thread::spawn(move || {
            for item in iter {
                if qtx.send(item).is_err() {
                    break;
                }
            }
        });

        loop {
            let item = match qrx.recv_timeout(POLL_INTERVAL) {
                Ok(item) => item,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if layr.is_finished() {
                        drop(qrx);
                        producer.join().ok();
                        return Ok(());
                    }
                    continue;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            };

            let mut items = vec![item];
            for _ in 0..SYNC_QUEUE {
                match qrx.try_recv() {
                    Ok(item) => items.push(item),
                    Err(_) => break,
                }
            }

            for item in items {
                let (eoffs, edits) = item?;
                layr.stor_node_edits_no_lift(edits, EditMeta::default())?;
                layr.set_offset(&iden, (eoffs + 1) as i64)?;
                layr.wake_upstream_waits(&iden, eoffs + 1);
                offs = eoffs + 1;
            }
        }

        // peer stream ended, re-open from the current offset.
        producer.join().ok();
    }
}
