//! Lift families: resolve an abbreviation prefix, hand the scan to the
//! storage-type dispatch, join the resulting buids back into storage
//! nodes.
//!
//! An abbreviation that was never assigned means nothing was ever
//! indexed under it, so those lifts return empty without touching the
//! backend.

use crate::{
    layer::{Layer, StorNode},
    stortypes::{self, IndxBy, NodeValuSrc},
    types::{Buid, Valu, STOR_FLAG_ARRAY, STOR_TYPE_MSGP},
    Error, Result,
};

/// One comparison of a lift: comparator symbol, right-hand value and
/// the storage type to compare under.
pub type CmprValu<'a> = (&'a str, Valu, u16);

impl Layer {
    fn indx_by_form(&self, form: &str) -> Result<Option<IndxBy>> {
        let abrv = match self.prop_abrv_lookup(Some(form), None)? {
            Some(abrv) => abrv,
            None => return Ok(None),
        };
        Ok(Some(IndxBy {
            slab: &self.slab,
            db: self.byprop,
            bybuid: self.bybuid,
            abrv: abrv.to_vec(),
            src: NodeValuSrc::Form,
        }))
    }

    fn indx_by_prop(&self, form: Option<&str>, prop: &str) -> Result<Option<IndxBy>> {
        let abrv = match self.prop_abrv_lookup(form, Some(prop))? {
            Some(abrv) => abrv,
            None => return Ok(None),
        };
        Ok(Some(IndxBy {
            slab: &self.slab,
            db: self.byprop,
            bybuid: self.bybuid,
            abrv: abrv.to_vec(),
            src: NodeValuSrc::Prop(prop.to_string()),
        }))
    }

    fn indx_by_prop_array(&self, form: Option<&str>, prop: &str) -> Result<Option<IndxBy>> {
        let abrv = match self.prop_abrv_lookup(form, Some(prop))? {
            Some(abrv) => abrv,
            None => return Ok(None),
        };
        Ok(Some(IndxBy {
            slab: &self.slab,
            db: self.byarray,
            bybuid: self.bybuid,
            abrv: abrv.to_vec(),
            src: NodeValuSrc::Prop(prop.to_string()),
        }))
    }

    fn indx_by_tagprop(
        &self,
        form: Option<&str>,
        tag: &str,
        prop: &str,
    ) -> Result<Option<IndxBy>> {
        let abrv = match self.tagprop_abrv_lookup(form, Some(tag), prop)? {
            Some(abrv) => abrv,
            None => return Ok(None),
        };
        Ok(Some(IndxBy {
            slab: &self.slab,
            db: self.bytagprop,
            bybuid: self.bybuid,
            abrv: abrv.to_vec(),
            src: NodeValuSrc::TagProp {
                tag: tag.to_string(),
                prop: prop.to_string(),
            },
        }))
    }

    fn join_nodes(&self, buids: Vec<Buid>) -> Result<Vec<StorNode>> {
        let mut sodes = vec![];
        for buid in buids {
            sodes.push(self.get_stor_node(&buid)?);
        }
        Ok(sodes)
    }

    /// Lift every node of `form` carrying tag `tag`; across forms when
    /// `form` is None.
    pub fn lift_by_tag(&self, tag: &str, form: Option<&str>) -> Result<Vec<StorNode>> {
        let buids = self.tag_buids(tag, form)?;
        self.join_nodes(buids)
    }

    /// Lift nodes carrying tag `tag` whose tag value satisfies `cmpr`
    /// against `valu`, filtering on the stored interval before the
    /// node is joined.
    pub fn lift_by_tag_valu(
        &self,
        tag: &str,
        cmpr: &str,
        valu: &Valu,
        form: Option<&str>,
    ) -> Result<Vec<StorNode>> {
        let filt = tag_filt(cmpr, valu)?;

        let mut sodes = vec![];
        for buid in self.tag_buids(tag, form)? {
            match self.get_node_tag(&buid, tag)? {
                Some(tagv) if filt(&tagv) => sodes.push(self.get_stor_node(&buid)?),
                _ => (),
            }
        }
        Ok(sodes)
    }

    fn tag_buids(&self, tag: &str, form: Option<&str>) -> Result<Vec<Buid>> {
        let mut pref = match self.tagabrv.lookup(tag.as_bytes())? {
            Some(abrv) => abrv.to_vec(),
            None => return Ok(vec![]),
        };
        if let Some(form) = form {
            match self.prop_abrv_lookup(Some(form), None)? {
                Some(abrv) => pref.extend_from_slice(&abrv),
                None => return Ok(vec![]),
            }
        }

        let mut buids = vec![];
        for item in self.slab.scan_by_pref(self.bytag, &pref) {
            let (_, val) = item?;
            buids.push(Buid::from_slice(&val));
        }
        Ok(buids)
    }

    /// Whether any node anywhere carries a tag property named `name`.
    pub fn has_tag_prop(&self, name: &str) -> Result<bool> {
        let abrv = match self.tagprop_abrv_lookup(None, None, name)? {
            Some(abrv) => abrv,
            None => return Ok(false),
        };
        for item in self.slab.scan_by_pref(self.bytagprop, &abrv) {
            item?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Lift every node carrying tag property `tag:prop`, scoped to
    /// `form` when given.
    pub fn lift_by_tag_prop(
        &self,
        form: Option<&str>,
        tag: &str,
        prop: &str,
    ) -> Result<Vec<StorNode>> {
        let abrv = match self.tagprop_abrv_lookup(form, Some(tag), prop)? {
            Some(abrv) => abrv,
            None => return Ok(vec![]),
        };

        let mut buids = vec![];
        for item in self.slab.scan_by_pref(self.bytagprop, &abrv) {
            let (_, val) = item?;
            buids.push(Buid::from_slice(&val));
        }
        self.join_nodes(buids)
    }

    /// Lift nodes whose tag property `tag:prop` satisfies every
    /// comparison in `cmprvals`.
    pub fn lift_by_tag_prop_valu(
        &self,
        form: Option<&str>,
        tag: &str,
        prop: &str,
        cmprvals: &[CmprValu],
    ) -> Result<Vec<StorNode>> {
        let mut sodes = vec![];
        for (cmpr, valu, kind) in cmprvals {
            let ixby = match self.indx_by_tagprop(form, tag, prop)? {
                Some(ixby) => ixby,
                None => continue,
            };
            let buids = stortypes::get(*kind)?.lift(&ixby, cmpr, valu)?;
            sodes.extend(self.join_nodes(buids)?);
        }
        Ok(sodes)
    }

    /// Lift every node carrying `form:prop`. A `prop` of None lifts by
    /// the form itself, a `form` of None lifts a universal property
    /// across forms.
    pub fn lift_by_prop(
        &self,
        form: Option<&str>,
        prop: Option<&str>,
    ) -> Result<Vec<StorNode>> {
        let abrv = match self.prop_abrv_lookup(form, prop)? {
            Some(abrv) => abrv,
            None => return Ok(vec![]),
        };

        let mut buids = vec![];
        for item in self.slab.scan_by_pref(self.byprop, &abrv) {
            let (_, val) = item?;
            buids.push(Buid::from_slice(&val));
        }
        self.join_nodes(buids)
    }

    /// Lift nodes whose primary form value satisfies every comparison
    /// in `cmprvals`.
    pub fn lift_by_form_valu(
        &self,
        form: &str,
        cmprvals: &[CmprValu],
    ) -> Result<Vec<StorNode>> {
        let mut sodes = vec![];
        for (cmpr, valu, kind) in cmprvals {
            let ixby = match self.indx_by_form(form)? {
                Some(ixby) => ixby,
                None => continue,
            };
            let buids = stortypes::get(*kind)?.lift(&ixby, cmpr, valu)?;
            sodes.extend(self.join_nodes(buids)?);
        }
        Ok(sodes)
    }

    /// Lift nodes whose property value satisfies every comparison in
    /// `cmprvals`. Array-typed comparisons match on the whole array.
    pub fn lift_by_prop_valu(
        &self,
        form: &str,
        prop: &str,
        cmprvals: &[CmprValu],
    ) -> Result<Vec<StorNode>> {
        let mut sodes = vec![];
        for (cmpr, valu, kind) in cmprvals {
            // whole-array rows are indexed under the opaque encoding.
            let kind = match kind & STOR_FLAG_ARRAY {
                0 => *kind,
                _ => STOR_TYPE_MSGP,
            };
            let ixby = match self.indx_by_prop(Some(form), prop)? {
                Some(ixby) => ixby,
                None => continue,
            };
            let buids = stortypes::get(kind)?.lift(&ixby, cmpr, valu)?;
            sodes.extend(self.join_nodes(buids)?);
        }
        Ok(sodes)
    }

    /// Lift nodes whose array property contains an element satisfying
    /// the comparisons in `cmprvals`.
    pub fn lift_by_prop_array(
        &self,
        form: &str,
        prop: &str,
        cmprvals: &[CmprValu],
    ) -> Result<Vec<StorNode>> {
        let mut sodes = vec![];
        for (cmpr, valu, kind) in cmprvals {
            let ixby = match self.indx_by_prop_array(Some(form), prop)? {
                Some(ixby) => ixby,
                None => continue,
            };
            let buids = stortypes::get(kind & !STOR_FLAG_ARRAY)?.lift(&ixby, cmpr, valu)?;
            sodes.extend(self.join_nodes(buids)?);
        }
        Ok(sodes)
    }
}

// filter applied to the stored tag interval before a node joins a
// tag-value lift.
fn tag_filt(cmpr: &str, valu: &Valu) -> Result<Box<dyn Fn(&Valu) -> bool + 'static>> {
    match cmpr {
        "=" => {
            let valu = valu.clone();
            Ok(Box::new(move |item: &Valu| *item == valu))
        }
        "@=" => {
            let (lo, hi) = match valu.as_list() {
                Some(items) if items.len() == 2 => {
                    match (items[0].as_int(), items[1].as_int()) {
                        (Some(lo), Some(hi)) => (lo, hi),
                        _ => err_at!(InvalidInput, msg: "@= wants a (lo, hi) interval")?,
                    }
                }
                _ => err_at!(InvalidInput, msg: "@= wants a (lo, hi) interval")?,
            };
            Ok(Box::new(move |item: &Valu| {
                let items = match item.as_list() {
                    Some(items) if items.len() == 2 => items,
                    _ => return false,
                };
                let (tick, tock) = match (items[0].as_int(), items[1].as_int()) {
                    (Some(tick), Some(tock)) => (tick, tock),
                    _ => return false,
                };
                tick < hi && tock > lo
            }))
        }
        _ => err_at!(NoSuchCmpr, msg: "tag value lift has no {:?}", cmpr),
    }
}
