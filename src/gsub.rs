//! Glyph substitution (`gsub`) implementation.
//!
//! > The Glyph Substitution (GSUB) table provides data for substition of glyphs for appropriate
//! > rendering of scripts, such as cursively-connecting forms in Arabic script, or for advanced
//! > typographic effects, such as ligatures.
//!
//! — <https://docs.microsoft.com/en-us/typography/opentype/spec/gsub>

use log::debug;

use crate::apply::{ApplyContext, LookupApply, MAX_NESTING_LEVEL, NO_CONTEXT};
use crate::buffer::{GlyphInfo, GlyphProps, GlyphStream};
use crate::context::GlyphTable;
use crate::layout::{
    GDEFTable, LayoutTable, LigatureSubst, Lookup, MultipleSubst, SingleSubst, SubstLookup, GSUB,
};
use crate::tag::DisplayTag;

impl LookupApply for GSUB {
    fn apply_subtables<'a, 'b>(
        ctx: &mut ApplyContext<'a, 'b, GSUB>,
        lookup: &'b Lookup<'a, GSUB>,
        context_length: usize,
        nesting_budget: usize,
    ) -> bool {
        let glyph = match ctx.stream.cur() {
            Some(info) => *info,
            None => return false,
        };
        match lookup.subtables {
            SubstLookup::SingleSubst(ref subtables) => subtables
                .iter()
                .any(|subtable| single_subst(ctx, subtable, glyph)),
            SubstLookup::MultipleSubst(ref subtables) => subtables
                .iter()
                .any(|subtable| multiple_subst(ctx, subtable, glyph)),
            SubstLookup::LigatureSubst(ref subtables) => subtables
                .iter()
                .any(|subtable| ligature_subst(ctx, subtable, glyph, context_length)),
            SubstLookup::ContextSubst(ref subtables) => subtables
                .iter()
                .any(|subtable| ctx.context_lookup(subtable, context_length, nesting_budget)),
            SubstLookup::ChainContextSubst(ref subtables) => subtables.iter().any(|subtable| {
                ctx.chain_context_lookup(subtable, context_length, nesting_budget)
            }),
            SubstLookup::Unsupported => false,
        }
    }
}

/// Properties of a glyph produced by a substitution.
///
/// `GDEF` decides when it has glyph classes, otherwise the glyph inherits `fallback`.
fn substitute_props(
    opt_gdef_table: Option<&GDEFTable<'_>>,
    glyph_index: u16,
    fallback: GlyphProps,
) -> GlyphProps {
    match opt_gdef_table {
        Some(gdef_table) if gdef_table.opt_glyph_classdef.is_some() => {
            GlyphProps::from_gdef(opt_gdef_table, glyph_index)
        }
        _ => fallback,
    }
}

fn single_subst(
    ctx: &mut ApplyContext<'_, '_, GSUB>,
    subtable: &SingleSubst<'_>,
    glyph: GlyphInfo,
) -> bool {
    match subtable.apply_glyph(glyph.glyph_index) {
        Some(glyph_index) => {
            let props = substitute_props(ctx.opt_gdef_table, glyph_index, glyph.props);
            ctx.stream
                .replace_glyph(GlyphInfo::new(glyph_index, props, glyph.cluster));
            true
        }
        None => false,
    }
}

fn multiple_subst(
    ctx: &mut ApplyContext<'_, '_, GSUB>,
    subtable: &MultipleSubst<'_>,
    glyph: GlyphInfo,
) -> bool {
    let sequence_table = match subtable.apply_glyph(glyph.glyph_index) {
        Some(sequence_table) => sequence_table,
        None => return false,
    };
    let opt_gdef_table = ctx.opt_gdef_table;
    let glyphs = sequence_table
        .substitute_glyphs
        .iter()
        .map(|glyph_index| {
            let props = substitute_props(opt_gdef_table, glyph_index, glyph.props);
            GlyphInfo::new(glyph_index, props, glyph.cluster)
        })
        .collect::<Vec<_>>();
    if glyphs.is_empty() {
        debug!("deleting glyph {}", glyph.glyph_index);
    }
    ctx.stream.replace_glyphs(1, glyphs);
    true
}

fn ligature_subst(
    ctx: &mut ApplyContext<'_, '_, GSUB>,
    subtable: &LigatureSubst<'_>,
    glyph: GlyphInfo,
    context_length: usize,
) -> bool {
    let ligature_set = match subtable.apply_glyph(glyph.glyph_index) {
        Some(ligature_set) => ligature_set,
        None => return false,
    };
    let match_type = ctx.match_type;
    let opt_gdef_table = ctx.opt_gdef_table;
    for ligature in ligature_set.ligatures.iter() {
        let components = GlyphTable::ById(ligature.component_glyphs);
        let opt_match_length =
            match_type.match_input(opt_gdef_table, &*ctx.stream, context_length, &components);
        let match_length = match opt_match_length {
            Some(match_length) => match_length,
            None => continue,
        };

        // Glyphs skipped between the components follow the ligature
        let in_pos = ctx.stream.in_pos();
        let skipped = ctx
            .stream
            .input()
            .get(in_pos + 1..in_pos + match_length)
            .unwrap_or(&[])
            .iter()
            .filter(|info| match_type.skip_glyph(opt_gdef_table, info))
            .copied()
            .collect::<Vec<_>>();
        let props = substitute_props(opt_gdef_table, ligature.ligature_glyph, GlyphProps::LIGATURE);
        let ligature_info = GlyphInfo::new(ligature.ligature_glyph, props, glyph.cluster);
        ctx.stream
            .replace_glyphs(match_length, std::iter::once(ligature_info).chain(skipped));
        return true;
    }
    false
}

/// Apply lookup `lookup_index` to every glyph of `stream` in one pass.
///
/// The pass writes to the output sequence, which becomes the input when it finishes. Returns
/// whether the lookup applied anywhere.
pub fn apply_lookup(
    gsub_table: &LayoutTable<'_, GSUB>,
    opt_gdef_table: Option<&GDEFTable<'_>>,
    lookup_index: usize,
    stream: &mut GlyphStream,
) -> bool {
    stream.clear_output();
    let mut applied = false;
    {
        let mut ctx = ApplyContext::new(gsub_table, opt_gdef_table, stream);
        while ctx.stream.in_pos() < ctx.stream.len() {
            let in_pos = ctx.stream.in_pos();
            let done = ctx.apply_lookup(lookup_index, NO_CONTEXT, MAX_NESTING_LEVEL);
            applied |= done;
            if !done || ctx.stream.in_pos() == in_pos {
                ctx.stream.next_glyph();
            }
        }
    }
    stream.swap_buffers();
    applied
}

/// Apply the lookups of `feature_tags` for a script and language to `stream`, in lookup list
/// order.
///
/// Glyph properties are recomputed from `GDEF` first when it is present.
pub fn apply_features(
    gsub_table: &LayoutTable<'_, GSUB>,
    opt_gdef_table: Option<&GDEFTable<'_>>,
    script_tag: u32,
    opt_lang_tag: Option<u32>,
    feature_tags: &[u32],
    stream: &mut GlyphStream,
) {
    if opt_gdef_table.is_some() {
        stream.set_glyph_props(opt_gdef_table);
    }
    let lookups = gsub_table.build_lookups(script_tag, opt_lang_tag, feature_tags);
    for (lookup_index, feature_tag) in lookups {
        debug!(
            "applying lookup {} for feature {}",
            lookup_index,
            DisplayTag(feature_tag)
        );
        apply_lookup(gsub_table, opt_gdef_table, lookup_index, stream);
    }
}
