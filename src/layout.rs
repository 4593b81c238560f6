//! `GSUB`, `GPOS` and `GDEF` table parsing.
//!
//! Every table here is a borrowed view over the font data. Lists, lookups and subtable headers
//! are validated when the table is read. Rule sets, rules, sequences, ligatures and the coverage
//! tables of format 3 contexts are reached through an [OffsetArray] and read when a glyph selects
//! them. Lookups and scripts at the same offset are read once and shared, so the decoded table
//! grows with the size of the data, not with the number of paths through it.
//!
//! A structure that fails validation is dropped where it is referenced: a bad rule leaves its
//! siblings usable, a bad subtable leaves the rest of its lookup usable and a bad lookup leaves
//! an empty slot in the lookup list. Only a malformed root header is an error.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use bitflags::bitflags;
use log::warn;

use crate::binary::read::{
    ReadArray, ReadArrayDep, ReadBinary, ReadBinaryDep, ReadCache, ReadCtxt, ReadFixedSizeDep,
    ReadFrom, ReadScope,
};
use crate::binary::{U16Be, U32Be};
use crate::context::{ContextLookupHelper, GlyphTable, LookupFlag, MatchContext};
use crate::error::ParseError;
use crate::size;
use crate::tag;

pub enum GSUB {}
pub enum GPOS {}

pub struct GDEFTable<'a> {
    pub opt_glyph_classdef: Option<ClassDef<'a>>,
    pub opt_mark_attach_classdef: Option<ClassDef<'a>>,
    /// Mark glyph sets, indexed by the mark filtering set of a lookup. Present from GDEF 1.2.
    pub opt_mark_glyph_sets: Option<Vec<Coverage<'a>>>,
}

// GSUB and GPOS tables have the same top-level structure
pub struct LayoutTable<'a, T: LayoutTableType> {
    pub opt_script_list: Option<ScriptList<'a>>,
    pub opt_feature_list: Option<FeatureList<'a>>,
    pub opt_lookup_list: Option<LookupList<'a, T>>,
}

pub struct ScriptList<'a> {
    script_records: Vec<ScriptRecord<'a>>,
}

pub struct ScriptRecord<'a> {
    pub script_tag: u32,
    /// Shared by every record with the same script offset.
    script_table: Arc<ScriptTable<'a>>,
}

pub struct ScriptTable<'a> {
    opt_default_langsys: Option<LangSys<'a>>,
    langsys_records: Vec<LangSysRecord<'a>>,
}

pub struct LangSysRecord<'a> {
    pub langsys_tag: u32,
    langsys_table: LangSys<'a>,
}

pub struct LangSys<'a> {
    opt_required_feature_index: Option<u16>,
    feature_indices: ReadArray<'a, U16Be>,
}

pub struct FeatureList<'a> {
    feature_records: Vec<FeatureRecord<'a>>,
}

pub struct FeatureRecord<'a> {
    pub feature_tag: u32,
    feature_table: FeatureTable<'a>,
}

pub struct FeatureTable<'a> {
    pub lookup_indices: ReadArray<'a, U16Be>,
}

/// The lookups of a layout table, indexed by lookup index.
///
/// A lookup that could not be read occupies its slot as `None` so that lookup indices stored
/// elsewhere in the table stay valid. Slots whose offsets are equal share one lookup.
pub struct LookupList<'a, T: LayoutTableType> {
    lookups: Vec<Option<Arc<Lookup<'a, T>>>>,
}

pub struct Lookup<'a, T: LayoutTableType> {
    /// The lookup type of the subtables, after resolving extension subtables.
    pub lookup_type: u16,
    pub lookup_flag: LookupFlag,
    pub opt_mark_filtering_set: Option<u16>,
    pub subtables: T::LookupType<'a>,
}

/// Extension subtable, referring to a subtable of another lookup type by 32-bit offset.
pub struct Extension<'a> {
    scope: ReadScope<'a>,
    pub extension_lookup_type: u16,
    extension_offset: u32,
}

pub enum SubstLookup<'a> {
    SingleSubst(Vec<SingleSubst<'a>>),
    MultipleSubst(Vec<MultipleSubst<'a>>),
    LigatureSubst(Vec<LigatureSubst<'a>>),
    ContextSubst(Vec<ContextLookup<'a>>),
    ChainContextSubst(Vec<ChainContextLookup<'a>>),
    /// A lookup type this crate does not apply.
    Unsupported,
}

pub enum PosLookup<'a> {
    SinglePos(Vec<SinglePos<'a>>),
    ContextPos(Vec<ContextLookup<'a>>),
    ChainContextPos(Vec<ChainContextLookup<'a>>),
    Unsupported,
}

pub trait LayoutTableType: Sized + 'static {
    type LookupType<'a>;

    const EXTENSION_LOOKUP_TYPE: u16;

    /// Decode the subtables of a lookup. Subtables that fail to parse are skipped.
    fn read_subtables<'a>(
        lookup_type: u16,
        subtables: &[ReadScope<'a>],
    ) -> Result<Self::LookupType<'a>, ParseError>;
}

impl<'b> ReadBinary for GDEFTable<'b> {
    type HostType<'a> = GDEFTable<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let table = ctxt.scope();

        let major_version = ctxt.read_u16be()?;
        ctxt.check_version(major_version == 1)?;
        let minor_version = ctxt.read_u16be()?;
        let glyph_classdef_offset = usize::from(ctxt.read_u16be()?);
        let _attach_list_offset = ctxt.read_u16be()?;
        let _lig_caret_list_offset = ctxt.read_u16be()?;
        // Some fonts carry MarkAttachClassDef without bumping the minor version, so it is read
        // regardless.
        let mark_attach_classdef_offset = usize::from(ctxt.read_u16be()?);
        let mark_glyph_sets_offset = if minor_version >= 2 {
            usize::from(ctxt.read_u16be()?)
        } else {
            0
        };

        let gdef_header_size = 6 * size::U16;
        let read_classdef = |offset: usize| {
            if offset < gdef_header_size {
                return None;
            }
            match table.offset(offset).read::<ClassDef<'_>>() {
                Ok(classdef) => Some(classdef),
                Err(err) => {
                    warn!("skipping invalid GDEF class definition: {}", err);
                    None
                }
            }
        };
        let opt_glyph_classdef = read_classdef(glyph_classdef_offset);
        let opt_mark_attach_classdef = read_classdef(mark_attach_classdef_offset);

        let opt_mark_glyph_sets = if mark_glyph_sets_offset == 0 {
            None
        } else {
            match read_mark_glyph_sets(table.offset(mark_glyph_sets_offset)) {
                Ok(mark_glyph_sets) => Some(mark_glyph_sets),
                Err(err) => {
                    warn!("skipping invalid mark glyph sets: {}", err);
                    None
                }
            }
        };

        Ok(GDEFTable {
            opt_glyph_classdef,
            opt_mark_attach_classdef,
            opt_mark_glyph_sets,
        })
    }
}

fn read_mark_glyph_sets(scope: ReadScope<'_>) -> Result<Vec<Coverage<'_>>, ParseError> {
    let mut ctxt = scope.ctxt();
    let format = ctxt.read_u16be()?;
    ctxt.check_version(format == 1)?;
    let mark_glyph_set_count = usize::from(ctxt.read_u16be()?);
    let coverage_offsets = ctxt.read_array::<U32Be>(mark_glyph_set_count)?;
    coverage_offsets
        .iter()
        .map(|offset| scope.offset(usize::try_from(offset)?).read::<Coverage<'_>>())
        .collect()
}

impl<'b, T: LayoutTableType> ReadBinary for LayoutTable<'b, T> {
    type HostType<'a> = LayoutTable<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let table = ctxt.scope();

        let major_version = ctxt.read_u16be()?;
        let _minor_version = ctxt.read_u16be()?;
        let script_list_offset = usize::from(ctxt.read_u16be()?);
        let feature_list_offset = usize::from(ctxt.read_u16be()?);
        let lookup_list_offset = usize::from(ctxt.read_u16be()?);

        // Other major versions may be laid out differently and are treated as having no content
        if major_version != 1 {
            return Ok(LayoutTable::empty());
        }

        // Version 1.1 also includes an offset to a FeatureVariations table, which is not used.

        Ok(LayoutTable {
            opt_script_list: read_optional::<ScriptList<'_>>(table, script_list_offset),
            opt_feature_list: read_optional::<FeatureList<'_>>(table, feature_list_offset),
            opt_lookup_list: read_optional::<LookupList<'_, T>>(table, lookup_list_offset),
        })
    }
}

fn read_optional<'a, T: ReadBinary<HostType<'a> = T>>(
    table: ReadScope<'a>,
    offset: usize,
) -> Option<T> {
    if offset == 0 {
        return None;
    }
    match table.offset(offset).read::<T>() {
        Ok(object) => Some(object),
        Err(err) => {
            warn!("skipping invalid layout list: {}", err);
            None
        }
    }
}

impl<'b> ReadBinary for ScriptList<'b> {
    type HostType<'a> = ScriptList<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let script_count = usize::from(ctxt.read_u16be()?);
        let records = ctxt.read_array::<(U32Be, U16Be)>(script_count)?;
        let mut script_cache = ReadCache::new();
        let script_records = records
            .iter()
            .map(|(script_tag, script_offset)| {
                let script_table = scope
                    .offset(usize::from(script_offset))
                    .read_cache::<ScriptTable<'_>>(&mut script_cache)?;
                Ok(ScriptRecord {
                    script_tag,
                    script_table,
                })
            })
            .collect::<Result<_, ParseError>>()?;
        Ok(ScriptList { script_records })
    }
}

impl<'b> ReadBinary for ScriptTable<'b> {
    type HostType<'a> = ScriptTable<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let default_langsys_offset = usize::from(ctxt.read_u16be()?);
        let opt_default_langsys = if default_langsys_offset != 0 {
            Some(scope.offset(default_langsys_offset).read::<LangSys<'_>>()?)
        } else {
            None
        };
        let langsys_count = usize::from(ctxt.read_u16be()?);
        let langsys_records = ctxt
            .read_array_dep::<LangSysRecord<'_>>(langsys_count, scope)?
            .read_to_vec()?;
        Ok(ScriptTable {
            opt_default_langsys,
            langsys_records,
        })
    }
}

impl<'b> ReadBinaryDep for LangSysRecord<'b> {
    type Args<'a> = ReadScope<'a>;
    type HostType<'a> = LangSysRecord<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        scope: Self::Args<'a>,
    ) -> Result<Self::HostType<'a>, ParseError> {
        let langsys_tag = ctxt.read_u32be()?;
        let langsys_offset = ctxt.read_u16be()?;
        let langsys_table = scope
            .offset(usize::from(langsys_offset))
            .read::<LangSys<'_>>()?;
        Ok(LangSysRecord {
            langsys_tag,
            langsys_table,
        })
    }
}

impl<'b> ReadFixedSizeDep for LangSysRecord<'b> {
    fn size(_scope: Self::Args<'_>) -> usize {
        size::U32 + size::U16
    }
}

impl<'b> ReadBinary for LangSys<'b> {
    type HostType<'a> = LangSys<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let _lookup_order = ctxt.read_u16be()?; // reserved, should be zero
        let required_feature_index = ctxt.read_u16be()?;
        let opt_required_feature_index = match required_feature_index {
            0xFFFF => None,
            index => Some(index),
        };
        let feature_index_count = usize::from(ctxt.read_u16be()?);
        let feature_indices = ctxt.read_array::<U16Be>(feature_index_count)?;
        Ok(LangSys {
            opt_required_feature_index,
            feature_indices,
        })
    }
}

impl<'b> ReadBinary for FeatureList<'b> {
    type HostType<'a> = FeatureList<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let feature_count = usize::from(ctxt.read_u16be()?);
        let feature_records = ctxt
            .read_array_dep::<FeatureRecord<'_>>(feature_count, scope)?
            .read_to_vec()?;
        Ok(FeatureList { feature_records })
    }
}

impl<'b> ReadBinaryDep for FeatureRecord<'b> {
    type Args<'a> = ReadScope<'a>;
    type HostType<'a> = FeatureRecord<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        scope: Self::Args<'a>,
    ) -> Result<Self::HostType<'a>, ParseError> {
        let feature_tag = ctxt.read_u32be()?;
        let feature_offset = ctxt.read_u16be()?;
        let feature_table = scope
            .offset(usize::from(feature_offset))
            .read::<FeatureTable<'_>>()?;
        Ok(FeatureRecord {
            feature_tag,
            feature_table,
        })
    }
}

impl<'b> ReadFixedSizeDep for FeatureRecord<'b> {
    fn size(_scope: Self::Args<'_>) -> usize {
        size::U32 + size::U16
    }
}

impl<'b> ReadBinary for FeatureTable<'b> {
    type HostType<'a> = FeatureTable<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let _feature_params = ctxt.read_u16be()?;
        let lookup_index_count = usize::from(ctxt.read_u16be()?);
        let lookup_indices = ctxt.read_array::<U16Be>(lookup_index_count)?;
        Ok(FeatureTable { lookup_indices })
    }
}

impl<'b, T: LayoutTableType> ReadBinary for LookupList<'b, T> {
    type HostType<'a> = LookupList<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let lookup_count = usize::from(ctxt.read_u16be()?);
        let lookup_offsets = ctxt.read_array::<U16Be>(lookup_count)?;
        let mut lookup_cache = ReadCache::new();
        let lookups = lookup_offsets
            .iter()
            .enumerate()
            .map(|(lookup_index, offset)| {
                if offset == 0 {
                    return None;
                }
                let lookup_scope = scope.offset(usize::from(offset));
                match lookup_scope.read_cache::<Lookup<'_, T>>(&mut lookup_cache) {
                    Ok(lookup) => Some(lookup),
                    Err(err) => {
                        warn!("skipping invalid lookup {}: {}", lookup_index, err);
                        None
                    }
                }
            })
            .collect();
        Ok(LookupList { lookups })
    }
}

impl<'a, T: LayoutTableType> LookupList<'a, T> {
    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// The lookup at `lookup_index`, or `None` if the index is out of range or the lookup is
    /// invalid.
    pub fn lookup(&self, lookup_index: usize) -> Option<&Lookup<'a, T>> {
        self.lookups.get(lookup_index).and_then(Option::as_deref)
    }
}

impl<'b, T: LayoutTableType> ReadBinary for Lookup<'b, T> {
    type HostType<'a> = Lookup<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let lookup_type = ctxt.read_u16be()?;
        let lookup_flag = LookupFlag::from_bits_retain(ctxt.read_u16be()?);
        let subtable_count = usize::from(ctxt.read_u16be()?);
        let subtable_offsets = ctxt.read_array::<U16Be>(subtable_count)?;
        let opt_mark_filtering_set = if lookup_flag.get_use_mark_filtering_set() {
            Some(ctxt.read_u16be()?)
        } else {
            None
        };

        let (lookup_type, subtables) = if lookup_type == T::EXTENSION_LOOKUP_TYPE {
            resolve_extensions::<T>(scope, subtable_offsets)?
        } else {
            let subtables = subtable_offsets
                .iter()
                .filter(|&offset| offset != 0)
                .map(|offset| scope.offset(usize::from(offset)))
                .collect::<Vec<_>>();
            (lookup_type, subtables)
        };

        Ok(Lookup {
            lookup_type,
            lookup_flag,
            opt_mark_filtering_set,
            subtables: T::read_subtables(lookup_type, &subtables)?,
        })
    }
}

/// Follow the extension subtables of a lookup to the subtables they refer to.
///
/// Every extension subtable of a lookup must name the same lookup type. The type is taken from
/// the first valid extension subtable; later ones that disagree, or that name the extension type
/// itself, are skipped.
fn resolve_extensions<'a, T: LayoutTableType>(
    scope: ReadScope<'a>,
    subtable_offsets: ReadArray<'a, U16Be>,
) -> Result<(u16, Vec<ReadScope<'a>>), ParseError> {
    let mut opt_lookup_type = None;
    let mut subtables = Vec::with_capacity(subtable_offsets.len());
    for offset in &subtable_offsets {
        if offset == 0 {
            continue;
        }
        let extension = match scope.offset(usize::from(offset)).read::<Extension<'_>>() {
            Ok(extension) => extension,
            Err(err) => {
                warn!("skipping invalid extension subtable: {}", err);
                continue;
            }
        };
        if extension.extension_lookup_type == T::EXTENSION_LOOKUP_TYPE {
            warn!("skipping nested extension subtable");
            continue;
        }
        match opt_lookup_type {
            None => opt_lookup_type = Some(extension.extension_lookup_type),
            Some(lookup_type) if lookup_type != extension.extension_lookup_type => {
                warn!(
                    "skipping extension subtable of type {} in lookup of type {}",
                    extension.extension_lookup_type, lookup_type
                );
                continue;
            }
            Some(_) => {}
        }
        if let Some((_lookup_type, subtable)) = extension.resolve() {
            subtables.push(subtable);
        }
    }
    let lookup_type = opt_lookup_type.ok_or(ParseError::BadValue)?;
    Ok((lookup_type, subtables))
}

impl<'b> ReadBinary for Extension<'b> {
    type HostType<'a> = Extension<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let extension_lookup_type = ctxt.read_u16be()?;
                let extension_offset = ctxt.read_u32be()?;
                Ok(Extension {
                    scope,
                    extension_lookup_type,
                    extension_offset,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> Extension<'a> {
    /// The lookup type and data of the subtable this extension refers to.
    ///
    /// A zero offset refers to no subtable.
    pub fn resolve(&self) -> Option<(u16, ReadScope<'a>)> {
        if self.extension_offset == 0 {
            return None;
        }
        let offset = usize::try_from(self.extension_offset).ok()?;
        Some((self.extension_lookup_type, self.scope.offset(offset)))
    }
}

impl LayoutTableType for GSUB {
    type LookupType<'a> = SubstLookup<'a>;

    const EXTENSION_LOOKUP_TYPE: u16 = 7;

    fn read_subtables<'a>(
        lookup_type: u16,
        subtables: &[ReadScope<'a>],
    ) -> Result<SubstLookup<'a>, ParseError> {
        match lookup_type {
            1 => Ok(SubstLookup::SingleSubst(read_subtables(subtables))),
            2 => Ok(SubstLookup::MultipleSubst(read_subtables(subtables))),
            4 => Ok(SubstLookup::LigatureSubst(read_subtables(subtables))),
            5 => Ok(SubstLookup::ContextSubst(read_subtables(subtables))),
            6 => Ok(SubstLookup::ChainContextSubst(read_subtables(subtables))),
            // Alternate and reverse chaining substitution
            3 | 8 => Ok(SubstLookup::Unsupported),
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl LayoutTableType for GPOS {
    type LookupType<'a> = PosLookup<'a>;

    const EXTENSION_LOOKUP_TYPE: u16 = 9;

    fn read_subtables<'a>(
        lookup_type: u16,
        subtables: &[ReadScope<'a>],
    ) -> Result<PosLookup<'a>, ParseError> {
        match lookup_type {
            1 => Ok(PosLookup::SinglePos(read_subtables(subtables))),
            7 => Ok(PosLookup::ContextPos(read_subtables(subtables))),
            8 => Ok(PosLookup::ChainContextPos(read_subtables(subtables))),
            2..=6 => Ok(PosLookup::Unsupported),
            _ => Err(ParseError::BadVersion),
        }
    }
}

fn read_subtables<'a, S: ReadBinary<HostType<'a> = S>>(subtables: &[ReadScope<'a>]) -> Vec<S> {
    let mut objects = Vec::with_capacity(subtables.len());
    for subtable in subtables {
        match subtable.read::<S>() {
            Ok(object) => objects.push(object),
            Err(err) => warn!("skipping invalid subtable: {}", err),
        }
    }
    objects
}

/// An array of offsets to tables of type `T`, which are read when they are accessed.
///
/// Tables reached through many offsets are read where they are used and never copied into the
/// structure holding the offsets.
pub struct OffsetArray<'a, T> {
    scope: ReadScope<'a>,
    offsets: ReadArray<'a, U16Be>,
    phantom: PhantomData<fn() -> T>,
}

impl<'a, T> Clone for OffsetArray<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for OffsetArray<'a, T> {}

impl<'a, T: ReadBinary<HostType<'a> = T>> OffsetArray<'a, T> {
    /// Offsets in `offsets` are relative to `scope`.
    pub fn new(scope: ReadScope<'a>, offsets: ReadArray<'a, U16Be>) -> OffsetArray<'a, T> {
        OffsetArray {
            scope,
            offsets,
            phantom: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The table at `index`. A null offset or a table that fails to parse gives `None`.
    pub fn get(&self, index: usize) -> Option<T> {
        let offset = self.offsets.get_item(index)?;
        if offset == 0 {
            return None;
        }
        match self.scope.offset(usize::from(offset)).read::<T>() {
            Ok(table) => Some(table),
            Err(err) => {
                warn!("skipping invalid subtable: {}", err);
                None
            }
        }
    }

    /// The tables that can be read, in order.
    pub fn iter(&self) -> impl Iterator<Item = T> + 'a
    where
        T: 'a,
    {
        let array = *self;
        (0..array.len()).filter_map(move |index| array.get(index))
    }

    /// The first table and the array of those after it.
    pub fn split_first(&self) -> Option<(Option<T>, OffsetArray<'a, T>)> {
        let (_first_offset, rest) = self.offsets.split_first()?;
        Some((self.get(0), OffsetArray::new(self.scope, rest)))
    }
}

impl<'a, T: LayoutTableType> LayoutTable<'a, T> {
    /// A table with no scripts, features or lookups.
    pub fn empty() -> LayoutTable<'a, T> {
        LayoutTable {
            opt_script_list: None,
            opt_feature_list: None,
            opt_lookup_list: None,
        }
    }

    pub fn script_count(&self) -> usize {
        self.opt_script_list
            .as_ref()
            .map_or(0, |script_list| script_list.script_records.len())
    }

    pub fn script_tag(&self, script_index: usize) -> Option<u32> {
        self.script_record(script_index)
            .map(|script_record| script_record.script_tag)
    }

    pub fn script(&self, script_index: usize) -> Option<&ScriptTable<'a>> {
        self.script_record(script_index)
            .map(|script_record| &*script_record.script_table)
    }

    fn script_record(&self, script_index: usize) -> Option<&ScriptRecord<'a>> {
        self.opt_script_list
            .as_ref()
            .and_then(|script_list| script_list.script_records.get(script_index))
    }

    pub fn find_script_index(&self, script_tag: u32) -> Option<usize> {
        let script_list = self.opt_script_list.as_ref()?;
        script_list
            .script_records
            .iter()
            .position(|script_record| script_record.script_tag == script_tag)
    }

    pub fn script_by_tag(&self, script_tag: u32) -> Option<&ScriptTable<'a>> {
        self.find_script_index(script_tag)
            .and_then(|script_index| self.script(script_index))
    }

    /// The script with `script_tag`, falling back to the `DFLT` script.
    pub fn find_script_or_default(&self, script_tag: u32) -> Option<&ScriptTable<'a>> {
        self.script_by_tag(script_tag)
            .or_else(|| self.script_by_tag(tag::DFLT))
    }

    pub fn feature_count(&self) -> usize {
        self.opt_feature_list
            .as_ref()
            .map_or(0, |feature_list| feature_list.feature_records.len())
    }

    pub fn feature_tag(&self, feature_index: usize) -> Option<u32> {
        self.feature_record(feature_index)
            .map(|feature_record| feature_record.feature_tag)
    }

    pub fn feature(&self, feature_index: usize) -> Option<&FeatureTable<'a>> {
        self.feature_record(feature_index)
            .map(|feature_record| &feature_record.feature_table)
    }

    fn feature_record(&self, feature_index: usize) -> Option<&FeatureRecord<'a>> {
        self.opt_feature_list
            .as_ref()
            .and_then(|feature_list| feature_list.feature_records.get(feature_index))
    }

    pub fn find_feature_index(&self, feature_tag: u32) -> Option<usize> {
        let feature_list = self.opt_feature_list.as_ref()?;
        feature_list
            .feature_records
            .iter()
            .position(|feature_record| feature_record.feature_tag == feature_tag)
    }

    pub fn feature_by_tag(&self, feature_tag: u32) -> Option<&FeatureTable<'a>> {
        self.find_feature_index(feature_tag)
            .and_then(|feature_index| self.feature(feature_index))
    }

    /// The feature of `langsys` with `feature_tag`.
    pub fn find_langsys_feature(
        &self,
        langsys: &LangSys<'a>,
        feature_tag: u32,
    ) -> Option<&FeatureTable<'a>> {
        langsys
            .feature_indices_iter()
            .filter_map(|feature_index| self.feature_record(usize::from(feature_index)))
            .find(|feature_record| feature_record.feature_tag == feature_tag)
            .map(|feature_record| &feature_record.feature_table)
    }

    /// Indices of the lookups enabled by `feature_tags` for a script and language, in lookup
    /// list order, each with the tag of the feature that enabled it.
    ///
    /// Falls back to the `DFLT` script and the default language system. The required feature of
    /// the language system is always included.
    pub fn build_lookups(
        &self,
        script_tag: u32,
        opt_lang_tag: Option<u32>,
        feature_tags: &[u32],
    ) -> BTreeMap<usize, u32> {
        let mut lookups = BTreeMap::new();
        let langsys = match self
            .find_script_or_default(script_tag)
            .and_then(|script| script.find_langsys_or_default(opt_lang_tag))
        {
            Some(langsys) => langsys,
            None => return lookups,
        };

        let opt_required = langsys.required_feature_index().and_then(|feature_index| {
            let feature_index = usize::from(feature_index);
            Some((self.feature_tag(feature_index)?, self.feature(feature_index)?))
        });
        let requested = feature_tags.iter().filter_map(|&feature_tag| {
            self.find_langsys_feature(langsys, feature_tag)
                .map(|feature_table| (feature_tag, feature_table))
        });
        for (feature_tag, feature_table) in opt_required.into_iter().chain(requested) {
            for lookup_index in &feature_table.lookup_indices {
                lookups
                    .entry(usize::from(lookup_index))
                    .or_insert(feature_tag);
            }
        }
        lookups
    }

    pub fn lookup_count(&self) -> usize {
        self.opt_lookup_list.as_ref().map_or(0, LookupList::len)
    }

    pub fn lookup(&self, lookup_index: usize) -> Option<&Lookup<'a, T>> {
        self.opt_lookup_list
            .as_ref()
            .and_then(|lookup_list| lookup_list.lookup(lookup_index))
    }
}

impl<'a> ScriptTable<'a> {
    pub fn default_langsys_record(&self) -> Option<&LangSys<'a>> {
        self.opt_default_langsys.as_ref()
    }

    pub fn langsys_count(&self) -> usize {
        self.langsys_records.len()
    }

    pub fn find_langsys(&self, langsys_tag: u32) -> Option<&LangSys<'a>> {
        self.langsys_records
            .iter()
            .find(|langsys_record| langsys_record.langsys_tag == langsys_tag)
            .map(|langsys_record| &langsys_record.langsys_table)
    }

    pub fn find_langsys_or_default(&self, opt_lang_tag: Option<u32>) -> Option<&LangSys<'a>> {
        opt_lang_tag
            .and_then(|lang_tag| self.find_langsys(lang_tag))
            .or_else(|| self.default_langsys_record())
    }
}

impl<'a> LangSys<'a> {
    pub fn required_feature_index(&self) -> Option<u16> {
        self.opt_required_feature_index
    }

    pub fn feature_indices_iter(&self) -> impl Iterator<Item = u16> + 'a {
        self.feature_indices.iter()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LookupRecord {
    pub sequence_index: u16,
    pub lookup_list_index: u16,
}

impl ReadFrom for LookupRecord {
    type ReadType = (U16Be, U16Be);
    fn read_from((sequence_index, lookup_list_index): (u16, u16)) -> Self {
        LookupRecord {
            sequence_index,
            lookup_list_index,
        }
    }
}

pub enum SingleSubst<'a> {
    Format1 {
        coverage: Coverage<'a>,
        delta_glyph_index: i16,
    },
    Format2 {
        coverage: Coverage<'a>,
        substitute_glyph_array: ReadArray<'a, U16Be>,
    },
}

impl<'b> ReadBinary for SingleSubst<'b> {
    type HostType<'a> = SingleSubst<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let subtable = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage_offset = usize::from(ctxt.read_u16be()?);
                let delta_glyph_index = ctxt.read_i16be()?;
                let coverage = subtable.offset(coverage_offset).read::<Coverage<'_>>()?;
                Ok(SingleSubst::Format1 {
                    coverage,
                    delta_glyph_index,
                })
            }
            2 => {
                let coverage_offset = usize::from(ctxt.read_u16be()?);
                let glyph_count = usize::from(ctxt.read_u16be()?);
                let substitute_glyph_array = ctxt.read_array::<U16Be>(glyph_count)?;
                let coverage = subtable.offset(coverage_offset).read::<Coverage<'_>>()?;
                Ok(SingleSubst::Format2 {
                    coverage,
                    substitute_glyph_array,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> SingleSubst<'a> {
    pub fn apply_glyph(&self, glyph: u16) -> Option<u16> {
        match *self {
            SingleSubst::Format1 {
                ref coverage,
                delta_glyph_index,
            } => {
                coverage.glyph_coverage_value(glyph)?;
                // Addition of deltaGlyphID is modulo 65536
                Some(glyph.wrapping_add_signed(delta_glyph_index))
            }
            SingleSubst::Format2 {
                ref coverage,
                ref substitute_glyph_array,
            } => {
                let coverage_index = coverage.glyph_coverage_value(glyph)?;
                substitute_glyph_array.get_item(usize::from(coverage_index))
            }
        }
    }
}

pub struct MultipleSubst<'a> {
    coverage: Coverage<'a>,
    sequences: OffsetArray<'a, SequenceTable<'a>>,
}

pub struct SequenceTable<'a> {
    pub substitute_glyphs: ReadArray<'a, U16Be>,
}

impl<'b> ReadBinary for MultipleSubst<'b> {
    type HostType<'a> = MultipleSubst<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage_offset = usize::from(ctxt.read_u16be()?);
                let sequence_count = usize::from(ctxt.read_u16be()?);
                let sequence_offsets = ctxt.read_array::<U16Be>(sequence_count)?;
                let sequences = OffsetArray::new(scope, sequence_offsets);
                let coverage = scope.offset(coverage_offset).read::<Coverage<'_>>()?;
                Ok(MultipleSubst {
                    coverage,
                    sequences,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> MultipleSubst<'a> {
    pub fn apply_glyph(&self, glyph: u16) -> Option<SequenceTable<'a>> {
        let coverage_index = self.coverage.glyph_coverage_value(glyph)?;
        self.sequences.get(usize::from(coverage_index))
    }
}

impl<'b> ReadBinary for SequenceTable<'b> {
    type HostType<'a> = SequenceTable<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        // Zero glyphs is not permitted by OpenType but fonts use it to delete a glyph
        let glyph_count = usize::from(ctxt.read_u16be()?);
        let substitute_glyphs = ctxt.read_array::<U16Be>(glyph_count)?;
        Ok(SequenceTable { substitute_glyphs })
    }
}

pub struct LigatureSubst<'a> {
    coverage: Coverage<'a>,
    ligaturesets: OffsetArray<'a, LigatureSet<'a>>,
}

pub struct LigatureSet<'a> {
    pub ligatures: OffsetArray<'a, Ligature<'a>>,
}

pub struct Ligature<'a> {
    pub ligature_glyph: u16,
    /// Components after the first, which is the glyph the set was selected by.
    pub component_glyphs: ReadArray<'a, U16Be>,
}

impl<'b> ReadBinary for LigatureSubst<'b> {
    type HostType<'a> = LigatureSubst<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage_offset = usize::from(ctxt.read_u16be()?);
                let ligatureset_count = usize::from(ctxt.read_u16be()?);
                let ligatureset_offsets = ctxt.read_array::<U16Be>(ligatureset_count)?;
                let ligaturesets = OffsetArray::new(scope, ligatureset_offsets);
                let coverage = scope.offset(coverage_offset).read::<Coverage<'_>>()?;
                Ok(LigatureSubst {
                    coverage,
                    ligaturesets,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> LigatureSubst<'a> {
    pub fn apply_glyph(&self, glyph: u16) -> Option<LigatureSet<'a>> {
        let coverage_index = self.coverage.glyph_coverage_value(glyph)?;
        self.ligaturesets.get(usize::from(coverage_index))
    }
}

impl<'b> ReadBinary for LigatureSet<'b> {
    type HostType<'a> = LigatureSet<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let ligature_count = usize::from(ctxt.read_u16be()?);
        let ligature_offsets = ctxt.read_array::<U16Be>(ligature_count)?;
        let ligatures = OffsetArray::new(scope, ligature_offsets);
        Ok(LigatureSet { ligatures })
    }
}

impl<'b> ReadBinary for Ligature<'b> {
    type HostType<'a> = Ligature<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let ligature_glyph = ctxt.read_u16be()?;
        let component_count = usize::from(ctxt.read_u16be()?);
        ctxt.check(component_count > 0)?;
        let component_glyphs = ctxt.read_array::<U16Be>(component_count - 1)?;
        Ok(Ligature {
            ligature_glyph,
            component_glyphs,
        })
    }
}

bitflags! {
    /// The fields present in a value record.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ValueFormat: u16 {
        const X_PLACEMENT = 0x0001;
        const Y_PLACEMENT = 0x0002;
        const X_ADVANCE = 0x0004;
        const Y_ADVANCE = 0x0008;
        const X_PLACEMENT_DEVICE = 0x0010;
        const Y_PLACEMENT_DEVICE = 0x0020;
        const X_ADVANCE_DEVICE = 0x0040;
        const Y_ADVANCE_DEVICE = 0x0080;
    }
}

impl ReadBinary for ValueFormat {
    type HostType<'a> = Self;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let value_format = ctxt.read_u16be()?;
        ValueFormat::from_bits(value_format).ok_or(ParseError::BadValue)
    }
}

impl ValueFormat {
    pub fn size(self) -> usize {
        self.bits().count_ones() as usize * size::U16
    }
}

/// Placement and advance adjustment of a single glyph.
///
/// Device table offsets are skipped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ValueRecord {
    pub x_placement: i16,
    pub y_placement: i16,
    pub x_advance: i16,
    pub y_advance: i16,
}

impl ReadBinaryDep for ValueRecord {
    type Args<'a> = ValueFormat;
    type HostType<'a> = Self;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        value_format: ValueFormat,
    ) -> Result<Self, ParseError> {
        let mut read_field = |flag: ValueFormat| -> Result<i16, ParseError> {
            if value_format.contains(flag) {
                Ok(ctxt.read_i16be()?)
            } else {
                Ok(0)
            }
        };
        let x_placement = read_field(ValueFormat::X_PLACEMENT)?;
        let y_placement = read_field(ValueFormat::Y_PLACEMENT)?;
        let x_advance = read_field(ValueFormat::X_ADVANCE)?;
        let y_advance = read_field(ValueFormat::Y_ADVANCE)?;
        for device in [
            ValueFormat::X_PLACEMENT_DEVICE,
            ValueFormat::Y_PLACEMENT_DEVICE,
            ValueFormat::X_ADVANCE_DEVICE,
            ValueFormat::Y_ADVANCE_DEVICE,
        ] {
            let _device_offset = read_field(device)?;
        }
        Ok(ValueRecord {
            x_placement,
            y_placement,
            x_advance,
            y_advance,
        })
    }
}

impl ReadFixedSizeDep for ValueRecord {
    fn size(value_format: ValueFormat) -> usize {
        value_format.size()
    }
}

pub enum SinglePos<'a> {
    Format1 {
        coverage: Coverage<'a>,
        value_record: ValueRecord,
    },
    Format2 {
        coverage: Coverage<'a>,
        value_records: ReadArrayDep<'a, ValueRecord>,
    },
}

impl<'b> ReadBinary for SinglePos<'b> {
    type HostType<'a> = SinglePos<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage_offset = usize::from(ctxt.read_u16be()?);
                let value_format = ctxt.read::<ValueFormat>()?;
                let value_record = ctxt.read_dep::<ValueRecord>(value_format)?;
                let coverage = scope.offset(coverage_offset).read::<Coverage<'_>>()?;
                Ok(SinglePos::Format1 {
                    coverage,
                    value_record,
                })
            }
            2 => {
                let coverage_offset = usize::from(ctxt.read_u16be()?);
                let value_format = ctxt.read::<ValueFormat>()?;
                let value_count = usize::from(ctxt.read_u16be()?);
                let value_records = ctxt.read_array_dep::<ValueRecord>(value_count, value_format)?;
                let coverage = scope.offset(coverage_offset).read::<Coverage<'_>>()?;
                Ok(SinglePos::Format2 {
                    coverage,
                    value_records,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> SinglePos<'a> {
    pub fn apply(&self, glyph: u16) -> Option<ValueRecord> {
        match *self {
            SinglePos::Format1 {
                ref coverage,
                value_record,
            } => coverage.glyph_coverage_value(glyph).map(|_| value_record),
            SinglePos::Format2 {
                ref coverage,
                ref value_records,
            } => {
                let coverage_index = coverage.glyph_coverage_value(glyph)?;
                value_records.read_item(usize::from(coverage_index)).ok()
            }
        }
    }
}

/// Contextual lookup subtable (GSUB type 5, GPOS type 7).
pub enum ContextLookup<'a> {
    /// Rule sets selected by coverage index, matching glyph ids.
    Format1 {
        coverage: Coverage<'a>,
        rulesets: OffsetArray<'a, RuleSet<'a>>,
    },
    /// Rule sets selected by input class, matching classes.
    Format2 {
        coverage: Coverage<'a>,
        classdef: ClassDef<'a>,
        classsets: OffsetArray<'a, RuleSet<'a>>,
    },
    /// A single rule matching a coverage table per input position.
    Format3 {
        coverages: OffsetArray<'a, Coverage<'a>>,
        lookup_records: ReadArray<'a, LookupRecord>,
    },
}

pub struct RuleSet<'a> {
    rules: OffsetArray<'a, Rule<'a>>,
}

pub struct Rule<'a> {
    /// Input criteria after the first glyph.
    input_sequence: ReadArray<'a, U16Be>,
    lookup_records: ReadArray<'a, LookupRecord>,
}

/// Chaining contextual lookup subtable (GSUB type 6, GPOS type 8).
pub enum ChainContextLookup<'a> {
    Format1 {
        coverage: Coverage<'a>,
        chain_rulesets: OffsetArray<'a, ChainRuleSet<'a>>,
    },
    Format2 {
        coverage: Coverage<'a>,
        backtrack_classdef: ClassDef<'a>,
        input_classdef: ClassDef<'a>,
        lookahead_classdef: ClassDef<'a>,
        chain_classsets: OffsetArray<'a, ChainRuleSet<'a>>,
    },
    Format3 {
        backtrack_coverages: OffsetArray<'a, Coverage<'a>>,
        input_coverages: OffsetArray<'a, Coverage<'a>>,
        lookahead_coverages: OffsetArray<'a, Coverage<'a>>,
        lookup_records: ReadArray<'a, LookupRecord>,
    },
}

pub struct ChainRuleSet<'a> {
    chain_rules: OffsetArray<'a, ChainRule<'a>>,
}

pub struct ChainRule<'a> {
    /// Backtrack criteria, nearest glyph first.
    backtrack_sequence: ReadArray<'a, U16Be>,
    input_sequence: ReadArray<'a, U16Be>,
    lookahead_sequence: ReadArray<'a, U16Be>,
    lookup_records: ReadArray<'a, LookupRecord>,
}

impl<'b> ReadBinary for ContextLookup<'b> {
    type HostType<'a> = ContextLookup<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage_offset = usize::from(ctxt.read_u16be()?);
                let ruleset_count = usize::from(ctxt.read_u16be()?);
                let ruleset_offsets = ctxt.read_array::<U16Be>(ruleset_count)?;
                let rulesets = OffsetArray::new(scope, ruleset_offsets);
                let coverage = scope.offset(coverage_offset).read::<Coverage<'_>>()?;
                Ok(ContextLookup::Format1 { coverage, rulesets })
            }
            2 => {
                let coverage_offset = usize::from(ctxt.read_u16be()?);
                let classdef_offset = usize::from(ctxt.read_u16be()?);
                let classset_count = usize::from(ctxt.read_u16be()?);
                let classset_offsets = ctxt.read_array::<U16Be>(classset_count)?;
                let classsets = OffsetArray::new(scope, classset_offsets);
                let coverage = scope.offset(coverage_offset).read::<Coverage<'_>>()?;
                let classdef = scope.offset(classdef_offset).read::<ClassDef<'_>>()?;
                Ok(ContextLookup::Format2 {
                    coverage,
                    classdef,
                    classsets,
                })
            }
            3 => {
                let glyph_count = usize::from(ctxt.read_u16be()?);
                ctxt.check(glyph_count > 0)?;
                let lookup_count = usize::from(ctxt.read_u16be()?);
                let coverage_offsets = ctxt.read_array::<U16Be>(glyph_count)?;
                let lookup_records = ctxt.read_array::<LookupRecord>(lookup_count)?;
                let coverages = OffsetArray::new(scope, coverage_offsets);
                Ok(ContextLookup::Format3 {
                    coverages,
                    lookup_records,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'b> ReadBinary for RuleSet<'b> {
    type HostType<'a> = RuleSet<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let rule_count = usize::from(ctxt.read_u16be()?);
        let rule_offsets = ctxt.read_array::<U16Be>(rule_count)?;
        let rules = OffsetArray::new(scope, rule_offsets);
        Ok(RuleSet { rules })
    }
}

impl<'b> ReadBinary for Rule<'b> {
    type HostType<'a> = Rule<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let glyph_count = usize::from(ctxt.read_u16be()?);
        ctxt.check(glyph_count > 0)?;
        let lookup_count = usize::from(ctxt.read_u16be()?);
        let input_sequence = ctxt.read_array::<U16Be>(glyph_count - 1)?;
        let lookup_records = ctxt.read_array::<LookupRecord>(lookup_count)?;
        Ok(Rule {
            input_sequence,
            lookup_records,
        })
    }
}

impl<'b> ReadBinary for ChainContextLookup<'b> {
    type HostType<'a> = ChainContextLookup<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage_offset = usize::from(ctxt.read_u16be()?);
                let chain_ruleset_count = usize::from(ctxt.read_u16be()?);
                let chain_ruleset_offsets = ctxt.read_array::<U16Be>(chain_ruleset_count)?;
                let chain_rulesets = OffsetArray::new(scope, chain_ruleset_offsets);
                let coverage = scope.offset(coverage_offset).read::<Coverage<'_>>()?;
                Ok(ChainContextLookup::Format1 {
                    coverage,
                    chain_rulesets,
                })
            }
            2 => {
                let coverage_offset = usize::from(ctxt.read_u16be()?);
                let backtrack_classdef_offset = usize::from(ctxt.read_u16be()?);
                let input_classdef_offset = usize::from(ctxt.read_u16be()?);
                let lookahead_classdef_offset = usize::from(ctxt.read_u16be()?);
                let chain_classset_count = usize::from(ctxt.read_u16be()?);
                let chain_classset_offsets = ctxt.read_array::<U16Be>(chain_classset_count)?;
                let chain_classsets = OffsetArray::new(scope, chain_classset_offsets);
                let coverage = scope.offset(coverage_offset).read::<Coverage<'_>>()?;
                let backtrack_classdef = scope
                    .offset(backtrack_classdef_offset)
                    .read::<ClassDef<'_>>()?;
                let input_classdef = scope
                    .offset(input_classdef_offset)
                    .read::<ClassDef<'_>>()?;
                let lookahead_classdef = scope
                    .offset(lookahead_classdef_offset)
                    .read::<ClassDef<'_>>()?;
                Ok(ChainContextLookup::Format2 {
                    coverage,
                    backtrack_classdef,
                    input_classdef,
                    lookahead_classdef,
                    chain_classsets,
                })
            }
            3 => {
                let backtrack_count = usize::from(ctxt.read_u16be()?);
                let backtrack_coverage_offsets = ctxt.read_array::<U16Be>(backtrack_count)?;
                let input_count = usize::from(ctxt.read_u16be()?);
                ctxt.check(input_count > 0)?;
                let input_coverage_offsets = ctxt.read_array::<U16Be>(input_count)?;
                let lookahead_count = usize::from(ctxt.read_u16be()?);
                let lookahead_coverage_offsets = ctxt.read_array::<U16Be>(lookahead_count)?;
                let lookup_count = usize::from(ctxt.read_u16be()?);
                let lookup_records = ctxt.read_array::<LookupRecord>(lookup_count)?;
                let backtrack_coverages = OffsetArray::new(scope, backtrack_coverage_offsets);
                let input_coverages = OffsetArray::new(scope, input_coverage_offsets);
                let lookahead_coverages = OffsetArray::new(scope, lookahead_coverage_offsets);
                Ok(ChainContextLookup::Format3 {
                    backtrack_coverages,
                    input_coverages,
                    lookahead_coverages,
                    lookup_records,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'b> ReadBinary for ChainRuleSet<'b> {
    type HostType<'a> = ChainRuleSet<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let chain_rule_count = usize::from(ctxt.read_u16be()?);
        let chain_rule_offsets = ctxt.read_array::<U16Be>(chain_rule_count)?;
        let chain_rules = OffsetArray::new(scope, chain_rule_offsets);
        Ok(ChainRuleSet { chain_rules })
    }
}

impl<'b> ReadBinary for ChainRule<'b> {
    type HostType<'a> = ChainRule<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let backtrack_count = usize::from(ctxt.read_u16be()?);
        let backtrack_sequence = ctxt.read_array::<U16Be>(backtrack_count)?;
        let input_count = usize::from(ctxt.read_u16be()?);
        ctxt.check(input_count > 0)?;
        let input_sequence = ctxt.read_array::<U16Be>(input_count - 1)?;
        let lookahead_count = usize::from(ctxt.read_u16be()?);
        let lookahead_sequence = ctxt.read_array::<U16Be>(lookahead_count)?;
        let lookup_count = usize::from(ctxt.read_u16be()?);
        let lookup_records = ctxt.read_array::<LookupRecord>(lookup_count)?;
        Ok(ChainRule {
            backtrack_sequence,
            input_sequence,
            lookahead_sequence,
            lookup_records,
        })
    }
}

/// Select the first rule of a contextual lookup that `f` matches at `glyph`.
///
/// `f` returns the length of input it matched. The selected rule and that length are returned.
pub fn context_lookup_info<'a>(
    context_lookup: &'a ContextLookup<'a>,
    glyph: u16,
    mut f: impl FnMut(&MatchContext<'a>) -> Option<usize>,
) -> Option<(ContextLookupHelper<'a>, usize)> {
    match context_lookup {
        ContextLookup::Format1 { coverage, rulesets } => {
            let coverage_index = coverage.glyph_coverage_value(glyph)?;
            let ruleset = rulesets.get(usize::from(coverage_index))?;
            find_rule(ruleset.rules.iter(), f, |rule| {
                let match_context = MatchContext::input(GlyphTable::ById(rule.input_sequence));
                (match_context, rule.lookup_records)
            })
        }
        ContextLookup::Format2 {
            coverage,
            classdef,
            classsets,
        } => {
            coverage.glyph_coverage_value(glyph)?;
            let class_value = classdef.glyph_class_value(glyph);
            let classset = classsets.get(usize::from(class_value))?;
            find_rule(classset.rules.iter(), f, |rule| {
                let input_table = GlyphTable::ByClassDef(classdef, rule.input_sequence);
                (MatchContext::input(input_table), rule.lookup_records)
            })
        }
        ContextLookup::Format3 {
            coverages,
            lookup_records,
        } => {
            let (first, rest) = coverages.split_first()?;
            first?.glyph_coverage_value(glyph)?;
            let match_context = MatchContext::input(GlyphTable::ByCoverage(rest));
            let match_length = f(&match_context)?;
            Some((
                ContextLookupHelper::new(match_context, *lookup_records),
                match_length,
            ))
        }
    }
}

/// Select the first rule of a chaining contextual lookup that `f` matches at `glyph`.
pub fn chain_context_lookup_info<'a>(
    chain_context_lookup: &'a ChainContextLookup<'a>,
    glyph: u16,
    mut f: impl FnMut(&MatchContext<'a>) -> Option<usize>,
) -> Option<(ContextLookupHelper<'a>, usize)> {
    match chain_context_lookup {
        ChainContextLookup::Format1 {
            coverage,
            chain_rulesets,
        } => {
            let coverage_index = coverage.glyph_coverage_value(glyph)?;
            let chain_ruleset = chain_rulesets.get(usize::from(coverage_index))?;
            find_rule(chain_ruleset.chain_rules.iter(), f, |rule| {
                let match_context = MatchContext {
                    backtrack_table: GlyphTable::ById(rule.backtrack_sequence),
                    input_table: GlyphTable::ById(rule.input_sequence),
                    lookahead_table: GlyphTable::ById(rule.lookahead_sequence),
                };
                (match_context, rule.lookup_records)
            })
        }
        ChainContextLookup::Format2 {
            coverage,
            backtrack_classdef,
            input_classdef,
            lookahead_classdef,
            chain_classsets,
        } => {
            coverage.glyph_coverage_value(glyph)?;
            let class_value = input_classdef.glyph_class_value(glyph);
            let chain_classset = chain_classsets.get(usize::from(class_value))?;
            find_rule(chain_classset.chain_rules.iter(), f, |rule| {
                let match_context = MatchContext {
                    backtrack_table: GlyphTable::ByClassDef(
                        backtrack_classdef,
                        rule.backtrack_sequence,
                    ),
                    input_table: GlyphTable::ByClassDef(input_classdef, rule.input_sequence),
                    lookahead_table: GlyphTable::ByClassDef(
                        lookahead_classdef,
                        rule.lookahead_sequence,
                    ),
                };
                (match_context, rule.lookup_records)
            })
        }
        ChainContextLookup::Format3 {
            backtrack_coverages,
            input_coverages,
            lookahead_coverages,
            lookup_records,
        } => {
            let (first, rest) = input_coverages.split_first()?;
            first?.glyph_coverage_value(glyph)?;
            let match_context = MatchContext {
                backtrack_table: GlyphTable::ByCoverage(*backtrack_coverages),
                input_table: GlyphTable::ByCoverage(rest),
                lookahead_table: GlyphTable::ByCoverage(*lookahead_coverages),
            };
            let match_length = f(&match_context)?;
            Some((
                ContextLookupHelper::new(match_context, *lookup_records),
                match_length,
            ))
        }
    }
}

/// The first of `rules` that `f` matches, in order.
fn find_rule<'a, R>(
    rules: impl Iterator<Item = R>,
    mut f: impl FnMut(&MatchContext<'a>) -> Option<usize>,
    rule_context: impl Fn(R) -> (MatchContext<'a>, ReadArray<'a, LookupRecord>),
) -> Option<(ContextLookupHelper<'a>, usize)> {
    rules.map(rule_context).find_map(|(match_context, lookup_records)| {
        let match_length = f(&match_context)?;
        Some((
            ContextLookupHelper::new(match_context, lookup_records),
            match_length,
        ))
    })
}

#[derive(Copy, Clone)]
pub enum Coverage<'a> {
    Format1 {
        glyph_array: ReadArray<'a, U16Be>,
    },
    Format2 {
        coverage_range_array: ReadArray<'a, CoverageRangeRecord>,
    },
}

#[derive(Copy, Clone)]
pub struct CoverageRangeRecord {
    start_glyph: u16,
    end_glyph: u16,
    start_coverage_index: u16,
}

impl ReadFrom for CoverageRangeRecord {
    type ReadType = (U16Be, U16Be, U16Be);
    fn read_from((start_glyph, end_glyph, start_coverage_index): (u16, u16, u16)) -> Self {
        CoverageRangeRecord {
            start_glyph,
            end_glyph,
            start_coverage_index,
        }
    }
}

impl<'b> ReadBinary for Coverage<'b> {
    type HostType<'a> = Coverage<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        match ctxt.read_u16be()? {
            1 => {
                let glyph_count = usize::from(ctxt.read_u16be()?);
                let glyph_array = ctxt.read_array::<U16Be>(glyph_count)?;
                Ok(Coverage::Format1 { glyph_array })
            }
            2 => {
                let coverage_range_count = usize::from(ctxt.read_u16be()?);
                let coverage_range_array =
                    ctxt.read_array::<CoverageRangeRecord>(coverage_range_count)?;
                for coverage_range in &coverage_range_array {
                    ctxt.check(coverage_range.start_glyph <= coverage_range.end_glyph)?;
                }
                Ok(Coverage::Format2 {
                    coverage_range_array,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> Coverage<'a> {
    pub fn glyph_coverage_value(&self, glyph: u16) -> Option<u16> {
        match self {
            Coverage::Format1 { glyph_array } => {
                // Glyph ids are sorted, as required for binary search
                let index = glyph_array.binary_search_by(|g| g.cmp(&glyph)).ok()?;
                u16::try_from(index).ok()
            }
            Coverage::Format2 {
                coverage_range_array,
            } => coverage_range_array
                .iter()
                .find(|range| range.start_glyph <= glyph && glyph <= range.end_glyph)
                .and_then(|range| {
                    range
                        .start_coverage_index
                        .checked_add(glyph - range.start_glyph)
                }),
        }
    }
}

#[derive(Copy, Clone)]
pub enum ClassDef<'a> {
    Format1 {
        start_glyph: u16,
        class_value_array: ReadArray<'a, U16Be>,
    },
    Format2 {
        class_range_array: ReadArray<'a, ClassRangeRecord>,
    },
}

#[derive(Copy, Clone)]
pub struct ClassRangeRecord {
    start_glyph: u16,
    end_glyph: u16,
    class_value: u16,
}

impl ReadFrom for ClassRangeRecord {
    type ReadType = (U16Be, U16Be, U16Be);
    fn read_from((start_glyph, end_glyph, class_value): (u16, u16, u16)) -> Self {
        ClassRangeRecord {
            start_glyph,
            end_glyph,
            class_value,
        }
    }
}

impl<'b> ReadBinary for ClassDef<'b> {
    type HostType<'a> = ClassDef<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        match ctxt.read_u16be()? {
            1 => {
                let start_glyph = ctxt.read_u16be()?;
                let glyph_count = usize::from(ctxt.read_u16be()?);
                let class_value_array = ctxt.read_array::<U16Be>(glyph_count)?;
                Ok(ClassDef::Format1 {
                    start_glyph,
                    class_value_array,
                })
            }
            2 => {
                let class_range_count = usize::from(ctxt.read_u16be()?);
                // Some fonts give a range count that exceeds the data, so fall back to the ranges
                // that are present
                let class_range_array = ctxt
                    .read_array::<ClassRangeRecord>(class_range_count)
                    .or_else(|_| ctxt.read_array_upto_hack::<ClassRangeRecord>(class_range_count))?;
                Ok(ClassDef::Format2 { class_range_array })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> ClassDef<'a> {
    /// The class of `glyph`. Glyphs not assigned a class are in class 0.
    pub fn glyph_class_value(&self, glyph: u16) -> u16 {
        match self {
            ClassDef::Format1 {
                start_glyph,
                class_value_array,
            } => glyph
                .checked_sub(*start_glyph)
                .and_then(|class_index| class_value_array.get_item(usize::from(class_index)))
                .unwrap_or(0),
            ClassDef::Format2 { class_range_array } => class_range_array
                .iter()
                .find(|range| range.start_glyph <= glyph && glyph <= range.end_glyph)
                .map_or(0, |range| range.class_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::writer::{self, TtfType::*};

    fn make_gdef_header(glyph_classdef_offset: u16) -> Vec<u8> {
        writer::convert(&[
            UInt16(1), // major version
            UInt16(0), // minor version
            UInt16(glyph_classdef_offset),
            UInt16(0), // attach list offset
            UInt16(0), // lig caret list offset
            UInt16(0), // mark attach classdef offset
        ])
    }

    #[test]
    fn test_read_gdef_zero_classdef_offset() {
        let data = make_gdef_header(0);
        let gdef = ReadScope::new(&data).read::<GDEFTable<'_>>().unwrap();
        assert!(gdef.opt_glyph_classdef.is_none());
    }

    #[test]
    fn test_read_gdef_too_small_classdef_offset() {
        // Offset is not past the end of the header
        let data = make_gdef_header(1);
        let gdef = ReadScope::new(&data).read::<GDEFTable<'_>>().unwrap();
        assert!(gdef.opt_glyph_classdef.is_none());
    }

    #[test]
    fn test_read_gdef_too_big_classdef_offset() {
        // Offset past the end of the table drops the class definition
        let data = make_gdef_header(1000);
        let gdef = ReadScope::new(&data).read::<GDEFTable<'_>>().unwrap();
        assert!(gdef.opt_glyph_classdef.is_none());
    }

    #[test]
    fn test_read_gdef_mark_glyph_sets() {
        let data = writer::convert(&[
            UInt16(1), // major version
            UInt16(2), // minor version
            UInt16(0),
            UInt16(0),
            UInt16(0),
            UInt16(0),
            UInt16(14), // mark glyph sets offset
            // MarkGlyphSets
            UInt16(1),  // format
            UInt16(1),  // count
            UInt32(8),  // coverage offset
            // Coverage
            UInt16(1),
            UInt16(2),
            UInt16(10),
            UInt16(11),
        ]);
        let gdef = ReadScope::new(&data).read::<GDEFTable<'_>>().unwrap();
        let sets = gdef.opt_mark_glyph_sets.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].glyph_coverage_value(11), Some(1));
        assert_eq!(sets[0].glyph_coverage_value(12), None);
    }

    #[test]
    fn read_gpos_v1_x() {
        let data = writer::convert(&[
            UInt16(1), // major version
            UInt16(2), // minor version
            UInt16(0), // script_list_offset
            UInt16(0), // feature_list_offset
            UInt16(0), // lookup_list_offset
        ]);
        assert!(ReadScope::new(&data).read::<LayoutTable<'_, GPOS>>().is_ok())
    }

    #[test]
    fn read_layout_other_major_version_is_empty() {
        let data = writer::convert(&[
            UInt16(2), // major version
            UInt16(0), // minor version
            UInt16(10),
            UInt16(10),
            UInt16(10),
        ]);
        let table = ReadScope::new(&data).read::<LayoutTable<'_, GSUB>>().unwrap();
        assert_eq!(table.script_count(), 0);
        assert_eq!(table.feature_count(), 0);
        assert_eq!(table.lookup_count(), 0);
    }

    #[test]
    fn read_layout_truncated_header() {
        let data = writer::convert(&[UInt16(1), UInt16(0), UInt16(0)]);
        assert_eq!(
            ReadScope::new(&data).read::<LayoutTable<'_, GSUB>>().err(),
            Some(ParseError::BadEof)
        );
    }

    #[test]
    fn coverage_format2_index() {
        let data = writer::convert(&[
            UInt16(2), // format
            UInt16(2), // range count
            UInt16(10),
            UInt16(12),
            UInt16(0),
            UInt16(20),
            UInt16(20),
            UInt16(3),
        ]);
        let coverage = ReadScope::new(&data).read::<Coverage<'_>>().unwrap();
        assert_eq!(coverage.glyph_coverage_value(11), Some(1));
        assert_eq!(coverage.glyph_coverage_value(20), Some(3));
        assert_eq!(coverage.glyph_coverage_value(13), None);
    }

    #[test]
    fn coverage_format2_rejects_inverted_range() {
        let data = writer::convert(&[UInt16(2), UInt16(1), UInt16(12), UInt16(10), UInt16(0)]);
        assert!(ReadScope::new(&data).read::<Coverage<'_>>().is_err());
    }

    #[test]
    fn classdef_format2_truncated_ranges() {
        let data = writer::convert(&[
            UInt16(2), // format
            UInt16(5), // range count, more than present
            UInt16(4),
            UInt16(6),
            UInt16(2),
        ]);
        let classdef = ReadScope::new(&data).read::<ClassDef<'_>>().unwrap();
        assert_eq!(classdef.glyph_class_value(5), 2);
        assert_eq!(classdef.glyph_class_value(7), 0);
    }

    #[test]
    fn classdef_format1() {
        let data = writer::convert(&[UInt16(1), UInt16(3), UInt16(2), UInt16(7), UInt16(8)]);
        let classdef = ReadScope::new(&data).read::<ClassDef<'_>>().unwrap();
        assert_eq!(classdef.glyph_class_value(2), 0);
        assert_eq!(classdef.glyph_class_value(3), 7);
        assert_eq!(classdef.glyph_class_value(4), 8);
        assert_eq!(classdef.glyph_class_value(5), 0);
    }

    #[test]
    fn extension_zero_offset_resolves_to_nothing() {
        let data = writer::convert(&[UInt16(1), UInt16(5), UInt32(0)]);
        let extension = ReadScope::new(&data).read::<Extension<'_>>().unwrap();
        assert!(extension.resolve().is_none());
    }

    #[test]
    fn extension_unknown_format() {
        let data = writer::convert(&[UInt16(2), UInt16(5), UInt32(8)]);
        assert_eq!(
            ReadScope::new(&data).read::<Extension<'_>>().err(),
            Some(ParseError::BadVersion)
        );
    }

    #[test]
    fn offset_array_reads_on_access() {
        let data = writer::convert(&[
            UInt16(0),  // null offset
            UInt16(6),  // coverage
            UInt16(12), // past the end
            // Coverage
            UInt16(1),
            UInt16(1),
            UInt16(4),
        ]);
        let scope = ReadScope::new(&data);
        let offsets = scope.ctxt().read_array::<U16Be>(3).unwrap();
        let coverages = OffsetArray::<Coverage<'_>>::new(scope, offsets);
        assert_eq!(coverages.len(), 3);
        assert!(coverages.get(0).is_none());
        assert_eq!(coverages.get(1).unwrap().glyph_coverage_value(4), Some(0));
        assert!(coverages.get(2).is_none());
        assert!(coverages.get(3).is_none());
        assert_eq!(coverages.iter().count(), 1);

        let (first, rest) = coverages.split_first().unwrap();
        assert!(first.is_none());
        assert_eq!(rest.len(), 2);
        assert!(rest.get(0).is_some());
    }

    #[test]
    fn single_subst_delta_wraps() {
        let data = writer::convert(&[
            UInt16(1),  // format
            UInt16(6),  // coverage offset
            Int16(-2),  // delta
            // Coverage
            UInt16(1),
            UInt16(1),
            UInt16(1),
        ]);
        let subst = ReadScope::new(&data).read::<SingleSubst<'_>>().unwrap();
        assert_eq!(subst.apply_glyph(1), Some(0xFFFF));
        assert_eq!(subst.apply_glyph(2), None);
    }

    #[test]
    fn value_format_rejects_unknown_bits() {
        let data = writer::convert(&[UInt16(0x0100)]);
        assert_eq!(
            ReadScope::new(&data).read::<ValueFormat>().err(),
            Some(ParseError::BadValue)
        );
    }

    #[test]
    fn value_record_skips_device_offsets() {
        let value_format = ValueFormat::X_ADVANCE | ValueFormat::X_ADVANCE_DEVICE;
        assert_eq!(value_format.size(), 4);
        let data = writer::convert(&[Int16(-40), UInt16(99)]);
        let value_record = ReadScope::new(&data)
            .read_dep::<ValueRecord>(value_format)
            .unwrap();
        assert_eq!(
            value_record,
            ValueRecord {
                x_advance: -40,
                ..ValueRecord::default()
            }
        );
    }
}
