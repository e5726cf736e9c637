//! Legacy splice stream: flatten logged node-edit batches into
//! one-event-per-row tuples for downstream consumers that still speak
//! the old wire format. Node-data edits produce no splice.

use cbordata::Cborize;

use crate::{
    layer::Layer,
    types::{Edit, LogEntry, Valu},
    Result,
};

/// Position of one splice: `(log_offset, node_index, edit_index)`.
pub type SpliceOffs = (u64, u64, u64);

const SPLICE_VER: u32 = 0x00150001;

/// One flattened event. Fields that do not apply to an event kind stay
/// at their defaults.
#[derive(Clone, Debug, Default, PartialEq, Cborize)]
pub struct Splice {
    pub act: String,
    pub form: String,
    pub formvalu: Valu,
    pub prop: String,
    pub tag: String,
    pub valu: Valu,
    pub oldv: Valu,
    pub user: String,
    pub time: i64,
    pub prov: String,
}

impl Splice {
    const ID: u32 = SPLICE_VER;
}

impl Layer {
    /// Yield `(offs, splice)` pairs from the node-edit log starting at
    /// `offs`, at most `size` log entries worth.
    pub fn splices(&self, offs: u64, size: usize) -> Result<Vec<(SpliceOffs, Splice)>> {
        let mut splices = vec![];
        for item in self.nodeeditlog.slice::<LogEntry>(offs, size) {
            let (offs, entry) = item?;
            splices.extend(self.make_splices(offs, &entry)?);
        }
        Ok(splices)
    }

    /// Like [Layer::splices], walking the log backwards from `offs`.
    /// `size` of None walks all the way back.
    pub fn splices_back(
        &self,
        offs: u64,
        size: Option<usize>,
    ) -> Result<Vec<(SpliceOffs, Splice)>> {
        let mut splices = vec![];
        let mut count = 0;
        for item in self.nodeeditlog.iter_back::<LogEntry>(offs) {
            let (offs, entry) = item?;
            splices.extend(self.make_splices(offs, &entry)?);
            count += 1;
            if let Some(size) = size {
                if count >= size {
                    break;
                }
            }
        }
        Ok(splices)
    }

    pub(crate) fn make_splices(
        &self,
        offs: u64,
        entry: &LogEntry,
    ) -> Result<Vec<(SpliceOffs, Splice)>> {
        let meta = &entry.meta;

        let mut splices = vec![];
        for (nodeoffs, ne) in entry.changes.iter().enumerate() {
            let mut formvalu: Option<Valu> = None;

            for (editoffs, edit) in ne.edits.iter().enumerate() {
                let spliceoffs = (offs, nodeoffs as u64, editoffs as u64);
                let mut splice = Splice {
                    form: ne.form.clone(),
                    user: meta.user.clone(),
                    time: meta.time,
                    prov: meta.prov.clone(),
                    ..Splice::default()
                };

                match edit {
                    Edit::NodeAdd { valu, .. } => {
                        formvalu = Some(valu.clone());
                        splice.act = "node:add".to_string();
                        splice.formvalu = valu.clone();
                    }
                    Edit::NodeDel { valu, .. } => {
                        formvalu = Some(valu.clone());
                        splice.act = "node:del".to_string();
                        splice.formvalu = valu.clone();
                    }
                    Edit::NodeDataSet { .. } | Edit::NodeDataDel { .. } => continue,
                    edit => {
                        // property-only batches do not carry the form
                        // value, fetch it from the primary row.
                        let fv = match &formvalu {
                            Some(fv) => fv.clone(),
                            None => {
                                let fv = self
                                    .get_node_valu(&ne.buid, None)?
                                    .unwrap_or(Valu::Nil);
                                formvalu = Some(fv.clone());
                                fv
                            }
                        };
                        splice.formvalu = fv;

                        match edit {
                            Edit::PropSet {
                                prop, valu, oldv, ..
                            } => {
                                splice.act = "prop:set".to_string();
                                splice.prop = prop.clone();
                                splice.valu = valu.clone();
                                splice.oldv = oldv.clone();
                            }
                            Edit::PropDel { prop, oldv, .. } => {
                                splice.act = "prop:del".to_string();
                                splice.prop = prop.clone();
                                splice.valu = oldv.clone();
                            }
                            Edit::TagSet { tag, valu, oldv } => {
                                splice.act = "tag:add".to_string();
                                splice.tag = tag.clone();
                                splice.valu = valu.clone();
                                splice.oldv = oldv.clone();
                            }
                            Edit::TagDel { tag, oldv } => {
                                splice.act = "tag:del".to_string();
                                splice.tag = tag.clone();
                                splice.valu = oldv.clone();
                            }
                            Edit::TagPropSet {
                                tag,
                                prop,
                                valu,
                                oldv,
                                ..
                            } => {
                                splice.act = "tag:prop:set".to_string();
                                splice.tag = tag.clone();
                                splice.prop = prop.clone();
                                splice.valu = valu.clone();
                                splice.oldv = oldv.clone();
                            }
                            Edit::TagPropDel {
                                tag, prop, oldv, ..
                            } => {
                                splice.act = "tag:prop:del".to_string();
                                splice.tag = tag.clone();
                                splice.prop = prop.clone();
                                splice.valu = oldv.clone();
                            }
                            _ => unreachable!(),
                        }
                    }
                }

                splices.push((spliceoffs, splice));
            }
        }

        Ok(splices)
    }
}
