//! The edit engine: one editor per edit kind, applied in caller order
//! within a single backend write transaction.
//!
//! Editors keep the primary `bybuid` rows and every derived index in
//! lock-step. Each editor returns `None` when its precondition failed
//! (the edit was a no-op), an empty list when the write landed on an
//! identical row, and otherwise the edits actually applied. Those
//! applied edits are the authoritative record for the sequence log.

use crate::{
    layer::{form_key, prop_key, tag_key, tagprop_key, Layer},
    slab::WriteTxn,
    stortypes,
    types::{
        Buid, Edit, FormRow, NodeEdit, PropRow, Valu, STOR_FLAG_ARRAY, STOR_TYPE_MSGP,
        STOR_TYPE_TIME,
    },
    util, Result,
};

fn indx_key(abrv: &[u8], indx: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(abrv.len() + indx.len());
    key.extend_from_slice(abrv);
    key.extend_from_slice(indx);
    key
}

impl Layer {
    pub(crate) fn apply_node_edit(
        &self,
        txn: &mut WriteTxn,
        ne: &NodeEdit,
    ) -> Result<Vec<Edit>> {
        let (buid, form) = (&ne.buid, ne.form.as_str());

        let mut changed = vec![];
        for edit in ne.edits.iter() {
            let items = match edit {
                Edit::NodeAdd { valu, stortype } => {
                    self.edit_node_add(txn, buid, form, valu, *stortype)?
                }
                Edit::NodeDel { .. } => self.edit_node_del(txn, buid)?,
                Edit::PropSet {
                    prop,
                    valu,
                    stortype,
                    ..
                } => self.edit_prop_set(txn, buid, form, prop, valu, *stortype)?,
                Edit::PropDel { prop, .. } => {
                    self.edit_prop_del(txn, buid, form, prop)?
                }
                Edit::TagSet { tag, valu, oldv } => {
                    self.edit_tag_set(txn, buid, form, tag, valu, oldv)?
                }
                Edit::TagDel { tag, .. } => self.edit_tag_del(txn, buid, form, tag)?,
                Edit::TagPropSet {
                    tag,
                    prop,
                    valu,
                    stortype,
                    ..
                } => self.edit_tagprop_set(txn, buid, form, tag, prop, valu, *stortype)?,
                Edit::TagPropDel { tag, prop, .. } => {
                    self.edit_tagprop_del(txn, buid, form, tag, prop)?
                }
                Edit::NodeDataSet { name, valu, .. } => {
                    self.edit_node_data_set(txn, buid, name, valu)?
                }
                Edit::NodeDataDel { name, .. } => {
                    self.edit_node_data_del(txn, buid, name)?
                }
            };
            if let Some(items) = items {
                changed.extend(items);
            }
        }

        Ok(changed)
    }

    // write every index row for `valu`. Arrays contribute one realtype
    // row per element into byarray plus a single whole-value row into
    // byprop under the opaque encoding.
    fn put_value_indx(
        &self,
        txn: &mut WriteTxn,
        abrv: &[u8],
        univabrv: Option<&[u8; 8]>,
        buid: &Buid,
        stortype: u16,
        valu: &Valu,
    ) -> Result<()> {
        if stortype & STOR_FLAG_ARRAY != 0 {
            for indx in stortypes::stor_indx(stortype, valu)? {
                txn.put_dup(self.byarray, &indx_key(abrv, &indx), buid.as_bytes())?;
                if let Some(univabrv) = univabrv {
                    txn.put_dup(self.byarray, &indx_key(univabrv, &indx), buid.as_bytes())?;
                }
            }
            for indx in stortypes::stor_indx(STOR_TYPE_MSGP, valu)? {
                txn.put_dup(self.byprop, &indx_key(abrv, &indx), buid.as_bytes())?;
                if let Some(univabrv) = univabrv {
                    txn.put_dup(self.byprop, &indx_key(univabrv, &indx), buid.as_bytes())?;
                }
            }
        } else {
            for indx in stortypes::stor_indx(stortype, valu)? {
                txn.put_dup(self.byprop, &indx_key(abrv, &indx), buid.as_bytes())?;
                if let Some(univabrv) = univabrv {
                    txn.put_dup(self.byprop, &indx_key(univabrv, &indx), buid.as_bytes())?;
                }
            }
        }
        Ok(())
    }

    fn del_value_indx(
        &self,
        txn: &mut WriteTxn,
        abrv: &[u8],
        univabrv: Option<&[u8; 8]>,
        buid: &Buid,
        stortype: u16,
        valu: &Valu,
    ) -> Result<()> {
        if stortype & STOR_FLAG_ARRAY != 0 {
            for indx in stortypes::stor_indx(stortype, valu)? {
                txn.del_dup(self.byarray, &indx_key(abrv, &indx), buid.as_bytes())?;
                if let Some(univabrv) = univabrv {
                    txn.del_dup(self.byarray, &indx_key(univabrv, &indx), buid.as_bytes())?;
                }
            }
            for indx in stortypes::stor_indx(STOR_TYPE_MSGP, valu)? {
                txn.del_dup(self.byprop, &indx_key(abrv, &indx), buid.as_bytes())?;
                if let Some(univabrv) = univabrv {
                    txn.del_dup(self.byprop, &indx_key(univabrv, &indx), buid.as_bytes())?;
                }
            }
        } else {
            for indx in stortypes::stor_indx(stortype, valu)? {
                txn.del_dup(self.byprop, &indx_key(abrv, &indx), buid.as_bytes())?;
                if let Some(univabrv) = univabrv {
                    txn.del_dup(self.byprop, &indx_key(univabrv, &indx), buid.as_bytes())?;
                }
            }
        }
        Ok(())
    }

    fn edit_node_add(
        &self,
        txn: &mut WriteTxn,
        buid: &Buid,
        form: &str,
        valu: &Valu,
        stortype: u16,
    ) -> Result<Option<Vec<Edit>>> {
        let byts = util::into_cbor_bytes(FormRow {
            form: form.to_string(),
            valu: valu.clone(),
            stortype,
        })?;
        if !txn.put_if_absent(self.bybuid, &form_key(buid), &byts)? {
            return Ok(None);
        }

        let abrv = self.prop_abrv(txn, Some(form), None)?;
        self.put_value_indx(txn, &abrv, None, buid, stortype, valu)?;

        self.formcounts.inc(txn, form, 1)?;

        let created_valu = Valu::int(util::now_millis());
        self.edit_prop_set(txn, buid, form, ".created", &created_valu, STOR_TYPE_TIME)?;

        let created = Edit::PropSet {
            prop: ".created".to_string(),
            valu: created_valu,
            oldv: Valu::Nil,
            stortype: STOR_TYPE_TIME,
        };
        let added = Edit::NodeAdd {
            valu: valu.clone(),
            stortype,
        };

        Ok(Some(vec![added, created]))
    }

    fn edit_node_del(&self, txn: &mut WriteTxn, buid: &Buid) -> Result<Option<Vec<Edit>>> {
        let byts = match txn.pop(self.bybuid, &form_key(buid))? {
            Some(byts) => byts,
            None => return Ok(None),
        };
        let (row, _): (FormRow, usize) = util::from_cbor_bytes(&byts)?;

        let abrv = self.prop_abrv(txn, Some(&row.form), None)?;
        self.del_value_indx(txn, &abrv, None, buid, row.stortype, &row.valu)?;

        self.formcounts.inc(txn, &row.form, -1)?;

        self.wipe_node_data(txn, buid)?;

        Ok(Some(vec![Edit::NodeDel {
            valu: row.valu,
            stortype: row.stortype,
        }]))
    }

    fn edit_prop_set(
        &self,
        txn: &mut WriteTxn,
        buid: &Buid,
        form: &str,
        prop: &str,
        valu: &Valu,
        stortype: u16,
    ) -> Result<Option<Vec<Edit>>> {
        let abrv = self.prop_abrv(txn, Some(form), Some(prop))?;
        // props starting with '.' are universal, also indexed form-less.
        let univabrv = match prop.starts_with('.') {
            true => Some(self.prop_abrv(txn, None, Some(prop))?),
            false => None,
        };

        let newb = util::into_cbor_bytes(PropRow {
            valu: valu.clone(),
            stortype,
        })?;
        let oldb = txn.replace(self.bybuid, &prop_key(buid, prop), &newb)?;

        let mut oldv = Valu::Nil;
        if let Some(oldb) = oldb {
            if oldb == newb {
                return Ok(Some(vec![]));
            }
            let (oldrow, _): (PropRow, usize) = util::from_cbor_bytes(&oldb)?;
            self.del_value_indx(
                txn,
                &abrv,
                univabrv.as_ref(),
                buid,
                oldrow.stortype,
                &oldrow.valu,
            )?;
            oldv = oldrow.valu;
        }

        self.put_value_indx(txn, &abrv, univabrv.as_ref(), buid, stortype, valu)?;

        Ok(Some(vec![Edit::PropSet {
            prop: prop.to_string(),
            valu: valu.clone(),
            oldv,
            stortype,
        }]))
    }

    fn edit_prop_del(
        &self,
        txn: &mut WriteTxn,
        buid: &Buid,
        form: &str,
        prop: &str,
    ) -> Result<Option<Vec<Edit>>> {
        let abrv = self.prop_abrv(txn, Some(form), Some(prop))?;
        let univabrv = match prop.starts_with('.') {
            true => Some(self.prop_abrv(txn, None, Some(prop))?),
            false => None,
        };

        let oldb = match txn.pop(self.bybuid, &prop_key(buid, prop))? {
            Some(oldb) => oldb,
            None => return Ok(None),
        };
        let (row, _): (PropRow, usize) = util::from_cbor_bytes(&oldb)?;

        self.del_value_indx(txn, &abrv, univabrv.as_ref(), buid, row.stortype, &row.valu)?;

        Ok(Some(vec![Edit::PropDel {
            prop: prop.to_string(),
            oldv: row.valu,
            stortype: row.stortype,
        }]))
    }

    fn edit_tag_set(
        &self,
        txn: &mut WriteTxn,
        buid: &Buid,
        form: &str,
        tag: &str,
        valu: &Valu,
        oldv: &Valu,
    ) -> Result<Option<Vec<Edit>>> {
        let tagabrv = self.tagabrv.to_abrv(txn, tag.as_bytes())?;
        let formabrv = self.prop_abrv(txn, Some(form), None)?;

        let newb = util::into_cbor_bytes(valu.clone())?;
        let oldb = txn.replace(self.bybuid, &tag_key(buid, tag), &newb)?;

        let mut oldv = oldv.clone();
        if let Some(oldb) = oldb {
            if oldb == newb {
                return Ok(None);
            }
            oldv = util::from_cbor_bytes::<Valu>(&oldb)?.0;
        }

        txn.put_dup(self.bytag, &indx_key(&tagabrv, &formabrv), buid.as_bytes())?;

        Ok(Some(vec![Edit::TagSet {
            tag: tag.to_string(),
            valu: valu.clone(),
            oldv,
        }]))
    }

    fn edit_tag_del(
        &self,
        txn: &mut WriteTxn,
        buid: &Buid,
        form: &str,
        tag: &str,
    ) -> Result<Option<Vec<Edit>>> {
        let oldb = match txn.pop(self.bybuid, &tag_key(buid, tag))? {
            Some(oldb) => oldb,
            None => return Ok(None),
        };

        let tagabrv = self.tagabrv.to_abrv(txn, tag.as_bytes())?;
        let formabrv = self.prop_abrv(txn, Some(form), None)?;
        txn.del_dup(self.bytag, &indx_key(&tagabrv, &formabrv), buid.as_bytes())?;

        let oldv = util::from_cbor_bytes::<Valu>(&oldb)?.0;

        Ok(Some(vec![Edit::TagDel {
            tag: tag.to_string(),
            oldv,
        }]))
    }

    fn edit_tagprop_set(
        &self,
        txn: &mut WriteTxn,
        buid: &Buid,
        form: &str,
        tag: &str,
        prop: &str,
        valu: &Valu,
        stortype: u16,
    ) -> Result<Option<Vec<Edit>>> {
        let p_abrv = self.tagprop_abrv(txn, None, None, prop)?;
        let tp_abrv = self.tagprop_abrv(txn, None, Some(tag), prop)?;
        let ftp_abrv = self.tagprop_abrv(txn, Some(form), Some(tag), prop)?;

        let newb = util::into_cbor_bytes(PropRow {
            valu: valu.clone(),
            stortype,
        })?;
        let oldb = txn.replace(self.bybuid, &tagprop_key(buid, tag, prop), &newb)?;

        let mut oldv = Valu::Nil;
        if let Some(oldb) = oldb {
            if oldb == newb {
                return Ok(None);
            }
            let (oldrow, _): (PropRow, usize) = util::from_cbor_bytes(&oldb)?;
            for oldi in stortypes::stor_indx(oldrow.stortype, &oldrow.valu)? {
                txn.del_dup(self.bytagprop, &indx_key(&p_abrv, &oldi), buid.as_bytes())?;
                txn.del_dup(self.bytagprop, &indx_key(&tp_abrv, &oldi), buid.as_bytes())?;
                txn.del_dup(self.bytagprop, &indx_key(&ftp_abrv, &oldi), buid.as_bytes())?;
            }
            oldv = oldrow.valu;
        }

        for indx in stortypes::stor_indx(stortype, valu)? {
            txn.put_dup(self.bytagprop, &indx_key(&p_abrv, &indx), buid.as_bytes())?;
            txn.put_dup(self.bytagprop, &indx_key(&tp_abrv, &indx), buid.as_bytes())?;
            txn.put_dup(self.bytagprop, &indx_key(&ftp_abrv, &indx), buid.as_bytes())?;
        }

        Ok(Some(vec![Edit::TagPropSet {
            tag: tag.to_string(),
            prop: prop.to_string(),
            valu: valu.clone(),
            oldv,
            stortype,
        }]))
    }

    fn edit_tagprop_del(
        &self,
        txn: &mut WriteTxn,
        buid: &Buid,
        form: &str,
        tag: &str,
        prop: &str,
    ) -> Result<Option<Vec<Edit>>> {
        let p_abrv = self.tagprop_abrv(txn, None, None, prop)?;
        let tp_abrv = self.tagprop_abrv(txn, None, Some(tag), prop)?;
        let ftp_abrv = self.tagprop_abrv(txn, Some(form), Some(tag), prop)?;

        let oldb = match txn.pop(self.bybuid, &tagprop_key(buid, tag, prop))? {
            Some(oldb) => oldb,
            None => return Ok(None),
        };
        let (row, _): (PropRow, usize) = util::from_cbor_bytes(&oldb)?;

        for oldi in stortypes::stor_indx(row.stortype, &row.valu)? {
            txn.del_dup(self.bytagprop, &indx_key(&p_abrv, &oldi), buid.as_bytes())?;
            txn.del_dup(self.bytagprop, &indx_key(&tp_abrv, &oldi), buid.as_bytes())?;
            txn.del_dup(self.bytagprop, &indx_key(&ftp_abrv, &oldi), buid.as_bytes())?;
        }

        Ok(Some(vec![Edit::TagPropDel {
            tag: tag.to_string(),
            prop: prop.to_string(),
            oldv: row.valu,
            stortype: row.stortype,
        }]))
    }

    fn edit_node_data_set(
        &self,
        txn: &mut WriteTxn,
        buid: &Buid,
        name: &str,
        valu: &Valu,
    ) -> Result<Option<Vec<Edit>>> {
        // node data names ride the form slot of the abbreviation.
        let abrv = self.prop_abrv(txn, Some(name), None)?;
        let mut key = buid.as_bytes().to_vec();
        key.extend_from_slice(&abrv);

        let newb = util::into_cbor_bytes(valu.clone())?;
        let oldb = txn.replace(self.nodedata, &key, &newb)?;

        let mut oldv = Valu::Nil;
        if let Some(oldb) = oldb {
            if oldb == newb {
                return Ok(None);
            }
            oldv = util::from_cbor_bytes::<Valu>(&oldb)?.0;
        }

        Ok(Some(vec![Edit::NodeDataSet {
            name: name.to_string(),
            valu: valu.clone(),
            oldv,
        }]))
    }

    fn edit_node_data_del(
        &self,
        txn: &mut WriteTxn,
        buid: &Buid,
        name: &str,
    ) -> Result<Option<Vec<Edit>>> {
        let abrv = self.prop_abrv(txn, Some(name), None)?;
        let mut key = buid.as_bytes().to_vec();
        key.extend_from_slice(&abrv);

        let oldb = match txn.pop(self.nodedata, &key)? {
            Some(oldb) => oldb,
            None => return Ok(None),
        };
        let oldv = util::from_cbor_bytes::<Valu>(&oldb)?.0;

        Ok(Some(vec![Edit::NodeDataDel {
            name: name.to_string(),
            oldv,
        }]))
    }

    // remove every node-data row for `buid`, reading through the open
    // transaction so rows written earlier in the same batch go too.
    fn wipe_node_data(&self, txn: &mut WriteTxn, buid: &Buid) -> Result<()> {
        for key in txn.scan_pref_keys(self.nodedata, buid.as_bytes())? {
            txn.del(self.nodedata, &key)?;
        }
        Ok(())
    }
}
