//! Glyph positioning (`gpos`) implementation.
//!
//! > The Glyph Positioning table (GPOS) provides precise control over glyph placement for
//! > sophisticated text layout and rendering in each script and language system that a font
//! > supports.
//!
//! — <https://docs.microsoft.com/en-us/typography/opentype/spec/gpos>
//!
//! Positioning passes run in place, so the glyph sequence is never changed by them.

use log::debug;

use crate::apply::{ApplyContext, LookupApply, MAX_NESTING_LEVEL, NO_CONTEXT};
use crate::buffer::{GlyphInfo, GlyphPosition, GlyphStream};
use crate::layout::{GDEFTable, LayoutTable, Lookup, PosLookup, SinglePos, ValueRecord, GPOS};
use crate::tag::DisplayTag;

impl LookupApply for GPOS {
    fn apply_subtables<'a, 'b>(
        ctx: &mut ApplyContext<'a, 'b, GPOS>,
        lookup: &'b Lookup<'a, GPOS>,
        context_length: usize,
        nesting_budget: usize,
    ) -> bool {
        let glyph = match ctx.stream.cur() {
            Some(info) => *info,
            None => return false,
        };
        match lookup.subtables {
            PosLookup::SinglePos(ref subtables) => subtables
                .iter()
                .any(|subtable| single_pos(ctx, subtable, glyph)),
            PosLookup::ContextPos(ref subtables) => subtables
                .iter()
                .any(|subtable| ctx.context_lookup(subtable, context_length, nesting_budget)),
            PosLookup::ChainContextPos(ref subtables) => subtables.iter().any(|subtable| {
                ctx.chain_context_lookup(subtable, context_length, nesting_budget)
            }),
            PosLookup::Unsupported => false,
        }
    }
}

impl ValueRecord {
    /// Add this record's adjustments to `position`.
    pub fn adjust(&self, position: &mut GlyphPosition) {
        position.x_offset += i32::from(self.x_placement);
        position.y_offset += i32::from(self.y_placement);
        position.x_advance += i32::from(self.x_advance);
        position.y_advance += i32::from(self.y_advance);
    }
}

fn single_pos(
    ctx: &mut ApplyContext<'_, '_, GPOS>,
    subtable: &SinglePos<'_>,
    glyph: GlyphInfo,
) -> bool {
    match subtable.apply(glyph.glyph_index) {
        Some(value_record) => {
            let in_pos = ctx.stream.in_pos();
            if let Some(position) = ctx.stream.position_mut(in_pos) {
                value_record.adjust(position);
            }
            ctx.stream.next_glyph();
            true
        }
        None => false,
    }
}

/// Apply lookup `lookup_index` to every glyph of `stream` in one in-place pass.
///
/// Adjustments add to those already in the stream. Returns whether the lookup applied anywhere.
pub fn apply_lookup(
    gpos_table: &LayoutTable<'_, GPOS>,
    opt_gdef_table: Option<&GDEFTable<'_>>,
    lookup_index: usize,
    stream: &mut GlyphStream,
) -> bool {
    stream.rewind();
    let mut applied = false;
    {
        let mut ctx = ApplyContext::new(gpos_table, opt_gdef_table, stream);
        while ctx.stream.in_pos() < ctx.stream.len() {
            let in_pos = ctx.stream.in_pos();
            let done = ctx.apply_lookup(lookup_index, NO_CONTEXT, MAX_NESTING_LEVEL);
            applied |= done;
            if !done || ctx.stream.in_pos() == in_pos {
                ctx.stream.next_glyph();
            }
        }
    }
    stream.rewind();
    applied
}

/// Position `stream` with the lookups of `feature_tags` for a script and language, in lookup
/// list order.
///
/// Existing adjustments are discarded first. Glyph properties are recomputed from `GDEF` when it
/// is present.
pub fn apply_features(
    gpos_table: &LayoutTable<'_, GPOS>,
    opt_gdef_table: Option<&GDEFTable<'_>>,
    script_tag: u32,
    opt_lang_tag: Option<u32>,
    feature_tags: &[u32],
    stream: &mut GlyphStream,
) {
    if opt_gdef_table.is_some() {
        stream.set_glyph_props(opt_gdef_table);
    }
    stream.clear_positions();
    let lookups = gpos_table.build_lookups(script_tag, opt_lang_tag, feature_tags);
    for (lookup_index, feature_tag) in lookups {
        debug!(
            "applying lookup {} for feature {}",
            lookup_index,
            DisplayTag(feature_tag)
        );
        apply_lookup(gpos_table, opt_gdef_table, lookup_index, stream);
    }
}
