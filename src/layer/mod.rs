//! Module implement the storage layer.
//!
//! A [Layer] owns one main backend environment holding the node rows
//! and every derived index, one sequence-log environment holding the
//! applied node-edits, and optionally a legacy splice log. Mutations
//! enter through [Layer::stor_node_edits]; reads go through the
//! storage-node and lift APIs; downstream layers follow this layer
//! through [Layer::sync_node_edits] or the [Upstream] machinery.
//!
//! Ordering contract: a per-layer write mutex serializes mutation
//! batches, so sequence-log offsets form a total order matching apply
//! order, and live windows observe that same order. Readers use MVCC
//! snapshots and never block the writer.

use cbordata::Cborize;
use log::{info, warn};

use std::{
    collections::{BTreeMap, HashMap},
    fs, path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread, time,
};

use crate::{
    abrv::{NameAbrv, ABRV_SIZE},
    config::Config,
    hotcount::HotCount,
    seqn::Seqn,
    slab::{Db, Opts, Slab, WriteTxn},
    types::{
        Buid, Edit, EditMeta, FormRow, LogEntry, ModelVers, NodeEdit, PropRow, Valu,
        ROW_FORM, ROW_PROP, ROW_TAG, ROW_TAGPROP,
    },
    util, Error, Result,
};

mod editor;
mod lift;
mod splice;
mod sync;
mod window;

pub use lift::CmprValu;
pub use splice::{Splice, SpliceOffs};
pub use sync::{SyncIter, Upstream};
pub use window::{Window, WINDOW_SIZE};

/// Name of the main backend environment under the layer directory.
pub const LAYER_SLAB: &str = "layer_v2.lmdb";
/// Name of the sequence-log environment.
pub const SEQN_SLAB: &str = "nodeedits.lmdb";
/// Name of the legacy splice-log environment.
pub const SPLICE_SLAB: &str = "splices.lmdb";

const PROP_KEY_VER: u32 = 0x00130001;

// canonical bytes behind a (form, prop) abbreviation. Empty strings
// stand for absent members, forms and props are never empty.
#[derive(Clone, Debug, Default, PartialEq, Cborize)]
pub(crate) struct PropKey {
    pub form: String,
    pub prop: String,
}

impl PropKey {
    const ID: u32 = PROP_KEY_VER;

    fn new(form: Option<&str>, prop: Option<&str>) -> PropKey {
        PropKey {
            form: form.unwrap_or("").to_string(),
            prop: prop.unwrap_or("").to_string(),
        }
    }
}

const TAGPROP_KEY_VER: u32 = 0x00140001;

#[derive(Clone, Debug, Default, PartialEq, Cborize)]
pub(crate) struct TagPropKey {
    pub form: String,
    pub tag: String,
    pub prop: String,
}

impl TagPropKey {
    const ID: u32 = TAGPROP_KEY_VER;

    fn new(form: Option<&str>, tag: Option<&str>, prop: &str) -> TagPropKey {
        TagPropKey {
            form: form.unwrap_or("").to_string(),
            tag: tag.unwrap_or("").to_string(),
            prop: prop.to_string(),
        }
    }
}

/// Storage optimized node representation, potentially partial, as
/// produced by this layer. `edits` carries the changes that were
/// *just* applied when returned from [Layer::stor_node_edits].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StorNode {
    pub buid: Buid,
    pub ndef: Option<(String, Valu)>,
    pub props: BTreeMap<String, Valu>,
    pub tags: BTreeMap<String, Valu>,
    pub tagprops: BTreeMap<(String, String), Valu>,
    pub edits: Vec<Edit>,
}

/// Identity and disposition of a layer, refer [Layer::pack].
#[derive(Clone, Debug, PartialEq)]
pub struct LayerInfo {
    pub iden: String,
    pub dirn: String,
    pub readonly: bool,
}

/// The storage layer. Refer to the [module documentation](crate::layer)
/// for the overall shape.
pub struct Layer {
    iden: String,
    dirn: path::PathBuf,
    config: Config,

    pub(crate) slab: Arc<Slab>,
    pub(crate) bybuid: Db,
    pub(crate) bytag: Db,
    pub(crate) byprop: Db,
    pub(crate) byarray: Db,
    pub(crate) bytagprop: Db,
    pub(crate) nodedata: Db,
    layrinfo: Db,

    pub(crate) formcounts: HotCount,
    pub(crate) offsets: HotCount,

    pub(crate) tagabrv: NameAbrv,
    pub(crate) propabrv: NameAbrv,
    pub(crate) tagpropabrv: NameAbrv,

    seqslab: Arc<Slab>,
    pub(crate) nodeeditlog: Seqn,
    spliceslab: Option<Arc<Slab>>,
    pub(crate) splicelog: Option<Seqn>,

    wlock: Mutex<()>,
    windows: Arc<Mutex<Vec<window::WindowEnt>>>,
    upstreamwaits: Mutex<HashMap<String, BTreeMap<u64, Vec<util::Event>>>>,
    syncers: Mutex<Vec<thread::JoinHandle<()>>>,
    finished: Arc<AtomicBool>,
}

impl Layer {
    /// Open, or create, the layer under `dir`. Existing log tail beyond
    /// the applied offset is replayed before the call returns.
    pub fn open(dir: &path::Path, iden: &str, config: Config) -> Result<Arc<Layer>> {
        if !config.readonly {
            err_at!(IOError, fs::create_dir_all(dir), "layer dir {:?}", dir)?;
        }

        let opts = Opts {
            readonly: config.readonly,
            lockmemory: config.lockmemory,
            map_size: config.map_size,
            max_dbs: config.max_dbs,
        };
        let slab = Arc::new(Slab::open(&dir.join(LAYER_SLAB), opts.clone())?);

        let bybuid = slab.init_db("bybuid", false)?;
        let bytag = slab.init_db("bytag", true)?;
        let byprop = slab.init_db("byprop", true)?;
        let byarray = slab.init_db("byarray", true)?;
        let bytagprop = slab.init_db("bytagprop", true)?;
        let nodedata = slab.init_db("nodedata", false)?;
        let layrinfo = slab.init_db("layrinfo", false)?;

        let formcounts = HotCount::new(&slab, "count:forms")?;
        let offsets = HotCount::new(&slab, "offsets")?;

        let tagabrv = NameAbrv::new(Arc::clone(&slab), "tagabrv")?;
        let propabrv = NameAbrv::new(Arc::clone(&slab), "propabrv")?;
        let tagpropabrv = NameAbrv::new(Arc::clone(&slab), "tagpropabrv")?;

        let seqslab = {
            let opts = Opts {
                readonly: config.readonly,
                max_dbs: 8,
                ..opts.clone()
            };
            Arc::new(Slab::open(&dir.join(SEQN_SLAB), opts.clone())?)
        };
        let nodeeditlog = Seqn::new(Arc::clone(&seqslab), "nodeedits")?;

        let (spliceslab, splicelog) = if config.fallback {
            let opts = Opts {
                readonly: config.readonly,
                max_dbs: 8,
                ..opts
            };
            let spliceslab = Arc::new(Slab::open(&dir.join(SPLICE_SLAB), opts)?);
            let splicelog = Seqn::new(Arc::clone(&spliceslab), "splices")?;
            (Some(spliceslab), Some(splicelog))
        } else {
            (None, None)
        };

        let layr = Arc::new(Layer {
            iden: iden.to_string(),
            dirn: dir.to_path_buf(),
            config,

            slab,
            bybuid,
            bytag,
            byprop,
            byarray,
            bytagprop,
            nodedata,
            layrinfo,

            formcounts,
            offsets,

            tagabrv,
            propabrv,
            tagpropabrv,

            seqslab,
            nodeeditlog,
            spliceslab,
            splicelog,

            wlock: Mutex::new(()),
            windows: Arc::new(Mutex::new(vec![])),
            upstreamwaits: Mutex::new(HashMap::new()),
            syncers: Mutex::new(vec![]),
            finished: Arc::new(AtomicBool::new(false)),
        });

        if !layr.config.readonly {
            layr.replay_tail()?;
            let mut txn = layr.slab.begin_write()?;
            txn.put_if_absent(layr.layrinfo, b"iden", layr.iden.as_bytes())?;
            txn.commit()?;
        }

        Ok(layr)
    }

    // close the startup gap between the log and the applied state, the
    // log is authoritative.
    fn replay_tail(&self) -> Result<()> {
        let applied = self.offsets.get("nodeedit:applied").unwrap_or(-1);
        let last = match self.nodeeditlog.last::<LogEntry>()? {
            Some((offs, _)) if (offs as i64) > applied => offs,
            _ => return Ok(()),
        };

        let mut entries = vec![];
        for item in self.nodeeditlog.iter::<LogEntry>((applied + 1) as u64) {
            let (_, entry) = item?;
            entries.push(entry);
        }

        info!(
            target: "stratum",
            "layer {} replaying {} batches, offsets {}..={}",
            self.iden, entries.len(), applied + 1, last
        );

        for entry in entries {
            self.stor_node_edits_no_lift(entry.changes, entry.meta)?;
        }

        Ok(())
    }

    /// Layer identity, as configured at open time.
    pub fn get_iden(&self) -> String {
        self.iden.clone()
    }

    /// Identity and disposition metadata.
    pub fn pack(&self) -> LayerInfo {
        LayerInfo {
            iden: self.iden.clone(),
            dirn: self.dirn.to_string_lossy().to_string(),
            readonly: self.config.readonly,
        }
    }

    /// Sequence-log index and backend statistics.
    pub fn stat(&self) -> Result<(u64, (usize, u32, usize, usize))> {
        Ok((self.nodeeditlog.index(), self.slab.stat()?))
    }

    /// Snapshot of the per-form node counts.
    pub fn get_form_counts(&self) -> HashMap<String, i64> {
        self.formcounts.pack()
    }

    /// Next sequence-log offset that will be assigned.
    pub fn get_node_edit_offset(&self) -> u64 {
        self.nodeeditlog.index()
    }

    /// Block until sequence-log offset `offs` is written, false on
    /// timeout.
    pub fn wait_for_offset(&self, offs: u64, timeout: Option<time::Duration>) -> bool {
        self.nodeeditlog.wait_for_offset(offs, timeout)
    }

    /// Stored data-model version, `(-1, -1, -1)` until set.
    pub fn get_model_vers(&self) -> Result<ModelVers> {
        match self.slab.get(self.layrinfo, b"model:version")? {
            Some(data) => Ok(util::from_cbor_bytes(&data)?.0),
            None => Ok(ModelVers::default()),
        }
    }

    /// Stamp the data-model version, the only path that alters it.
    pub fn set_model_vers(&self, vers: ModelVers) -> Result<()> {
        if self.config.readonly {
            err_at!(ReadOnly, msg: "set_model_vers on read-only layer")?;
        }
        let data = util::into_cbor_bytes(vers)?;
        let mut txn = self.slab.begin_write()?;
        txn.put(self.layrinfo, b"model:version", &data)?;
        txn.commit()
    }

    /// Stop upstream syncers, detach every live window and flush the
    /// backend. Subscribers see their stream end.
    pub fn close(&self) -> Result<()> {
        self.finished.store(true, Ordering::SeqCst);

        let syncers: Vec<thread::JoinHandle<()>> = {
            let mut syncers = err_at!(Fatal, self.syncers.lock())?;
            syncers.drain(..).collect()
        };
        for handle in syncers {
            err_at!(ThreadFail, handle.join().map_err(|_| "syncer panicked"))?;
        }

        err_at!(Fatal, self.windows.lock())?.clear();

        if !self.config.readonly {
            self.slab.sync()?;
            self.seqslab.sync()?;
            if let Some(spliceslab) = &self.spliceslab {
                spliceslab.sync()?;
            }
        }

        Ok(())
    }

    /// Close the layer and remove its directory from disk.
    pub fn delete(&self) -> Result<()> {
        self.close()?;
        err_at!(IOError, fs::remove_dir_all(&self.dirn), "{:?}", self.dirn)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    // ---- abbreviation plumbing.

    pub(crate) fn prop_abrv(
        &self,
        txn: &mut WriteTxn,
        form: Option<&str>,
        prop: Option<&str>,
    ) -> Result<[u8; ABRV_SIZE]> {
        let byts = util::into_cbor_bytes(PropKey::new(form, prop))?;
        self.propabrv.to_abrv(txn, &byts)
    }

    pub(crate) fn prop_abrv_lookup(
        &self,
        form: Option<&str>,
        prop: Option<&str>,
    ) -> Result<Option<[u8; ABRV_SIZE]>> {
        let byts = util::into_cbor_bytes(PropKey::new(form, prop))?;
        self.propabrv.lookup(&byts)
    }

    pub(crate) fn tagprop_abrv(
        &self,
        txn: &mut WriteTxn,
        form: Option<&str>,
        tag: Option<&str>,
        prop: &str,
    ) -> Result<[u8; ABRV_SIZE]> {
        let byts = util::into_cbor_bytes(TagPropKey::new(form, tag, prop))?;
        self.tagpropabrv.to_abrv(txn, &byts)
    }

    pub(crate) fn tagprop_abrv_lookup(
        &self,
        form: Option<&str>,
        tag: Option<&str>,
        prop: &str,
    ) -> Result<Option<[u8; ABRV_SIZE]>> {
        let byts = util::into_cbor_bytes(TagPropKey::new(form, tag, prop))?;
        self.tagpropabrv.lookup(&byts)
    }

    // ---- storage node reads.

    /// Read the stored value behind `buid`: the form value when `prop`
    /// is None, else the named property value.
    pub fn get_node_valu(&self, buid: &Buid, prop: Option<&str>) -> Result<Option<Valu>> {
        match prop {
            None => {
                let data = match self.slab.get(self.bybuid, &form_key(buid))? {
                    Some(data) => data,
                    None => return Ok(None),
                };
                let (row, _): (FormRow, usize) = util::from_cbor_bytes(&data)?;
                Ok(Some(row.valu))
            }
            Some(prop) => {
                let data = match self.slab.get(self.bybuid, &prop_key(buid, prop))? {
                    Some(data) => data,
                    None => return Ok(None),
                };
                let (row, _): (PropRow, usize) = util::from_cbor_bytes(&data)?;
                Ok(Some(row.valu))
            }
        }
    }

    /// Read the interval value of one tag on `buid`.
    pub fn get_node_tag(&self, buid: &Buid, tag: &str) -> Result<Option<Valu>> {
        let data = match self.slab.get(self.bybuid, &tag_key(buid, tag))? {
            Some(data) => data,
            None => return Ok(None),
        };
        Ok(Some(util::from_cbor_bytes(&data)?.0))
    }

    /// Assemble the potentially partial storage node behind `buid`. A
    /// prefix scan over `bybuid` yields the rows in kind order.
    pub fn get_stor_node(&self, buid: &Buid) -> Result<StorNode> {
        let mut sode = StorNode {
            buid: *buid,
            ..StorNode::default()
        };

        for item in self.slab.scan_by_pref(self.bybuid, buid.as_bytes()) {
            let (lkey, lval) = item?;
            if lkey.len() < 33 {
                warn!(target: "stratum", "runt bybuid row, {} bytes", lkey.len());
                continue;
            }
            match lkey[32] {
                ROW_FORM => {
                    let (row, _): (FormRow, usize) = util::from_cbor_bytes(&lval)?;
                    sode.ndef = Some((row.form, row.valu));
                }
                ROW_PROP => {
                    let name = row_name(&lkey)?;
                    let (row, _): (PropRow, usize) = util::from_cbor_bytes(&lval)?;
                    sode.props.insert(name, row.valu);
                }
                ROW_TAG => {
                    let name = row_name(&lkey)?;
                    let (valu, _): (Valu, usize) = util::from_cbor_bytes(&lval)?;
                    sode.tags.insert(name, valu);
                }
                ROW_TAGPROP => {
                    let name = row_name(&lkey)?;
                    let (tag, prop) = match name.split_once(':') {
                        Some((tag, prop)) => (tag.to_string(), prop.to_string()),
                        None => {
                            warn!(target: "stratum", "malformed tagprop row {:?}", name);
                            continue;
                        }
                    };
                    let (row, _): (PropRow, usize) = util::from_cbor_bytes(&lval)?;
                    sode.tagprops.insert((tag, prop), row.valu);
                }
                flag => warn!(target: "stratum", "unrecognized storage row: {}", flag),
            }
        }

        Ok(sode)
    }

    // ---- node data.

    /// Return a single element of a buid's node data.
    pub fn get_node_data(&self, buid: &Buid, name: &str) -> Result<Option<Valu>> {
        let abrv = match self.prop_abrv_lookup(Some(name), None)? {
            Some(abrv) => abrv,
            None => return Ok(None),
        };
        let mut key = buid.as_bytes().to_vec();
        key.extend_from_slice(&abrv);

        match self.slab.get(self.nodedata, &key)? {
            Some(data) => Ok(Some(util::from_cbor_bytes(&data)?.0)),
            None => Ok(None),
        }
    }

    /// Return all of a buid's node data as `(name, value)` pairs.
    pub fn iter_node_data(&self, buid: &Buid) -> Result<Vec<(String, Valu)>> {
        let mut items = vec![];
        for item in self.slab.scan_by_pref(self.nodedata, buid.as_bytes()) {
            let (lkey, lval) = item?;
            let abrv = &lkey[32..];
            let name = match self.propabrv.to_byts(abrv)? {
                Some(byts) => util::from_cbor_bytes::<PropKey>(&byts)?.0.form,
                None => {
                    warn!(target: "stratum", "nodedata row with unknown abbreviation");
                    continue;
                }
            };
            let (valu, _): (Valu, usize) = util::from_cbor_bytes(&lval)?;
            items.push((name, valu));
        }
        Ok(items)
    }

    // ---- row iteration for collaborators.

    /// Iterate `(buid, form_valu)` for every node of `form`.
    pub fn iter_form_rows(&self, form: &str) -> Result<Vec<(Buid, Valu)>> {
        let abrv = match self.prop_abrv_lookup(Some(form), None)? {
            Some(abrv) => abrv,
            None => return Ok(vec![]),
        };

        let mut rows = vec![];
        for item in self.slab.scan_by_pref(self.byprop, &abrv) {
            let (_, val) = item?;
            let buid = Buid::from_slice(&val);
            if let Some(valu) = self.get_node_valu(&buid, None)? {
                rows.push((buid, valu));
            }
        }
        Ok(rows)
    }

    /// Iterate `(buid, prop_valu)` for every node carrying
    /// `form:prop`.
    pub fn iter_prop_rows(&self, form: &str, prop: &str) -> Result<Vec<(Buid, Valu)>> {
        match self.prop_abrv_lookup(Some(form), Some(prop))? {
            Some(abrv) => self.prop_rows_by_abrv(&abrv, prop),
            None => Ok(vec![]),
        }
    }

    /// Iterate `(buid, prop_valu)` for every node carrying the
    /// universal property `prop`, across forms.
    pub fn iter_univ_rows(&self, prop: &str) -> Result<Vec<(Buid, Valu)>> {
        match self.prop_abrv_lookup(None, Some(prop))? {
            Some(abrv) => self.prop_rows_by_abrv(&abrv, prop),
            None => Ok(vec![]),
        }
    }

    fn prop_rows_by_abrv(&self, abrv: &[u8], prop: &str) -> Result<Vec<(Buid, Valu)>> {
        let mut rows = vec![];
        for item in self.slab.scan_by_pref(self.byprop, abrv) {
            let (_, val) = item?;
            let buid = Buid::from_slice(&val);
            if let Some(valu) = self.get_node_valu(&buid, Some(prop))? {
                rows.push((buid, valu));
            }
        }
        Ok(rows)
    }

    /// Scan the full layer and reconstruct synthetic node-edit sets,
    /// one per node; the seed payload for downstream bootstrap.
    pub fn iter_layer_node_edits(&self) -> Result<Vec<NodeEdit>> {
        let mut nodeedits: Vec<NodeEdit> = vec![];
        let mut current: Option<NodeEdit> = None;

        for item in self.slab.scan_full(self.bybuid) {
            let (lkey, lval) = item?;
            if lkey.len() < 33 {
                continue;
            }
            let buid = Buid::from_slice(&lkey[..32]);

            if current.as_ref().map(|ne| ne.buid) != Some(buid) && lkey[32] != ROW_FORM {
                // orphan row without a form row, skip.
                continue;
            }

            match lkey[32] {
                ROW_FORM => {
                    if let Some(mut ne) = current.take() {
                        self.push_node_data_edits(&mut ne)?;
                        nodeedits.push(ne);
                    }
                    let (row, _): (FormRow, usize) = util::from_cbor_bytes(&lval)?;
                    let edit = Edit::NodeAdd {
                        valu: row.valu,
                        stortype: row.stortype,
                    };
                    current = Some(NodeEdit::new(buid, &row.form, vec![edit]));
                }
                ROW_PROP => {
                    let name = row_name(&lkey)?;
                    let (row, _): (PropRow, usize) = util::from_cbor_bytes(&lval)?;
                    current.as_mut().unwrap().edits.push(Edit::PropSet {
                        prop: name,
                        valu: row.valu,
                        oldv: Valu::Nil,
                        stortype: row.stortype,
                    });
                }
                ROW_TAG => {
                    let name = row_name(&lkey)?;
                    let (valu, _): (Valu, usize) = util::from_cbor_bytes(&lval)?;
                    current.as_mut().unwrap().edits.push(Edit::TagSet {
                        tag: name,
                        valu,
                        oldv: Valu::Nil,
                    });
                }
                ROW_TAGPROP => {
                    let name = row_name(&lkey)?;
                    let (tag, prop) = match name.split_once(':') {
                        Some((tag, prop)) => (tag.to_string(), prop.to_string()),
                        None => continue,
                    };
                    let (row, _): (PropRow, usize) = util::from_cbor_bytes(&lval)?;
                    current.as_mut().unwrap().edits.push(Edit::TagPropSet {
                        tag,
                        prop,
                        valu: row.valu,
                        oldv: Valu::Nil,
                        stortype: row.stortype,
                    });
                }
                flag => warn!(target: "stratum", "unrecognized storage row: {}", flag),
            }
        }

        if let Some(mut ne) = current.take() {
            self.push_node_data_edits(&mut ne)?;
            nodeedits.push(ne);
        }

        Ok(nodeedits)
    }

    fn push_node_data_edits(&self, ne: &mut NodeEdit) -> Result<()> {
        for (name, valu) in self.iter_node_data(&ne.buid)? {
            ne.edits.push(Edit::NodeDataSet {
                name,
                valu,
                oldv: Valu::Nil,
            });
        }
        Ok(())
    }

    // ---- mutation entry points.

    /// Execute a batch of node-edit operations and return the updated
    /// storage nodes, each carrying the edits actually applied.
    pub fn stor_node_edits(
        &self,
        nodeedits: Vec<NodeEdit>,
        meta: EditMeta,
    ) -> Result<Vec<StorNode>> {
        let changes = self.stor_node_edits_inner(nodeedits, meta)?;

        let mut sodes = vec![];
        for change in changes {
            let mut sode = self.get_stor_node(&change.buid)?;
            sode.edits = change.edits;
            sodes.push(sode);
        }
        Ok(sodes)
    }

    /// Execute a batch of node-edit operations without building the
    /// result nodes; the replication and replay hot path.
    pub fn stor_node_edits_no_lift(
        &self,
        nodeedits: Vec<NodeEdit>,
        meta: EditMeta,
    ) -> Result<()> {
        self.stor_node_edits_inner(nodeedits, meta)?;
        Ok(())
    }

    fn stor_node_edits_inner(
        &self,
        nodeedits: Vec<NodeEdit>,
        meta: EditMeta,
    ) -> Result<Vec<NodeEdit>> {
        if self.config.readonly {
            err_at!(ReadOnly, msg: "stor_node_edits on read-only layer {}", self.iden)?;
        }

        let _w = err_at!(Fatal, self.wlock.lock())?;

        let mut txn = self.slab.begin_write()?;

        let mut changes = vec![];
        for ne in nodeedits {
            let edits = self.apply_node_edit(&mut txn, &ne)?;
            changes.push(NodeEdit {
                buid: ne.buid,
                form: ne.form,
                edits,
            });
        }

        // the log commits first; a crash between the two commits
        // leaves a tail that replay_tail re-applies.
        let entry = LogEntry {
            changes: changes.clone(),
            meta: meta.clone(),
        };
        let offs = self.nodeeditlog.add(entry)?;

        self.offsets.set(&mut txn, "nodeedit:applied", offs as i64)?;
        txn.commit()?;

        window::push(&self.windows, offs, &changes);

        if let Some(splicelog) = &self.splicelog {
            let entry = LogEntry {
                changes: changes.clone(),
                meta,
            };
            let splices: Vec<Splice> = self
                .make_splices(offs, &entry)?
                .into_iter()
                .map(|(_, splice)| splice)
                .collect();
            if !splices.is_empty() {
                splicelog.save(splices)?;
            }
        }

        Ok(changes)
    }

    // ---- offsets for upstream replication.

    pub(crate) fn set_offset(&self, name: &str, valu: i64) -> Result<()> {
        let mut txn = self.slab.begin_write()?;
        self.offsets.set(&mut txn, name, valu)?;
        txn.commit()
    }

    /// Return an event set once this layer has applied upstream
    /// `iden`'s edits through offset `offs`; already set when caught
    /// up.
    pub fn wait_upstream_offs(&self, iden: &str, offs: u64) -> Result<util::Event> {
        let event = util::Event::new();

        let mut waits = err_at!(Fatal, self.upstreamwaits.lock())?;
        if self.offsets.get(iden).unwrap_or(0) >= (offs as i64) {
            event.set();
        } else {
            waits
                .entry(iden.to_string())
                .or_insert_with(BTreeMap::new)
                .entry(offs)
                .or_insert_with(Vec::new)
                .push(event.clone());
        }

        Ok(event)
    }

    pub(crate) fn wake_upstream_waits(&self, iden: &str, offs: u64) {
        let mut waits = self.upstreamwaits.lock().unwrap();
        if let Some(offsmap) = waits.get_mut(iden) {
            let pending = offsmap.split_off(&(offs + 1));
            for (_, events) in std::mem::replace(offsmap, pending) {
                for event in events {
                    event.set();
                }
            }
        }
    }

    pub(crate) fn register_syncer(&self, handle: thread::JoinHandle<()>) {
        self.syncers.lock().unwrap().push(handle);
    }

    pub(crate) fn push_window(&self) -> Window {
        window::register(&self.windows, WINDOW_SIZE)
    }

    /// Acquire a live window: a bounded queue receiving every applied
    /// `(offset, changes)` batch from now on. Dropping the window
    /// unregisters it; a window that falls [WINDOW_SIZE] behind is
    /// dropped by the layer instead.
    pub fn get_node_edit_window(&self) -> Window {
        self.push_window()
    }
}

// `buid ‖ 0x00`
pub(crate) fn form_key(buid: &Buid) -> Vec<u8> {
    let mut key = buid.as_bytes().to_vec();
    key.push(ROW_FORM);
    key
}

// `buid ‖ 0x01 ‖ prop`
pub(crate) fn prop_key(buid: &Buid, prop: &str) -> Vec<u8> {
    let mut key = buid.as_bytes().to_vec();
    key.push(ROW_PROP);
    key.extend_from_slice(prop.as_bytes());
    key
}

// `buid ‖ 0x02 ‖ tag`
pub(crate) fn tag_key(buid: &Buid, tag: &str) -> Vec<u8> {
    let mut key = buid.as_bytes().to_vec();
    key.push(ROW_TAG);
    key.extend_from_slice(tag.as_bytes());
    key
}

// `buid ‖ 0x03 ‖ tag ‖ ':' ‖ prop`
pub(crate) fn tagprop_key(buid: &Buid, tag: &str, prop: &str) -> Vec<u8> {
    let mut key = buid.as_bytes().to_vec();
    key.push(ROW_TAGPROP);
    key.extend_from_slice(tag.as_bytes());
    key.push(b':');
    key.extend_from_slice(prop.as_bytes());
    key
}

fn row_name(lkey: &[u8]) -> Result<String> {
    match std::str::from_utf8(&lkey[33..]) {
        Ok(name) => Ok(name.to_string()),
        Err(err) => err_at!(DecodeFail, msg: "row name {}", err),
    }
}
