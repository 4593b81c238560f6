//! Applying lookups at the current position of a glyph stream.
//!
//! Contextual lookups match a window of glyphs around the cursor and then apply other lookups,
//! by index, at positions inside that window. Those lookups may be contextual themselves, so
//! application is recursive. Every nested call receives a smaller nesting budget and a call with
//! no budget left does nothing, which bounds the recursion for any font data.

use log::debug;
use tinyvec::TinyVec;

use crate::binary::read::ReadArray;
use crate::buffer::GlyphStream;
use crate::context::{MatchContext, MatchType};
use crate::layout::{
    chain_context_lookup_info, context_lookup_info, ChainContextLookup, ContextLookup, GDEFTable,
    LayoutTable, LayoutTableType, Lookup, LookupRecord,
};

/// Nesting budget given to a lookup applied from the top level.
pub const MAX_NESTING_LEVEL: usize = 8;

/// Context length that does not limit matching.
pub const NO_CONTEXT: usize = usize::MAX;

/// Lookup application specific to `GSUB` or `GPOS`.
pub trait LookupApply: LayoutTableType {
    /// Try the subtables of `lookup` in order at the current glyph, stopping at the first that
    /// applies. Returns whether one applied.
    fn apply_subtables<'a, 'b>(
        ctx: &mut ApplyContext<'a, 'b, Self>,
        lookup: &'b Lookup<'a, Self>,
        context_length: usize,
        nesting_budget: usize,
    ) -> bool;
}

pub struct ApplyContext<'a, 'b, T: LayoutTableType> {
    pub table: &'b LayoutTable<'a, T>,
    pub opt_gdef_table: Option<&'b GDEFTable<'b>>,
    pub stream: &'b mut GlyphStream,
    /// Skip rules of the lookup being applied.
    pub match_type: MatchType,
}

impl<'a, 'b, T: LookupApply> ApplyContext<'a, 'b, T> {
    pub fn new(
        table: &'b LayoutTable<'a, T>,
        opt_gdef_table: Option<&'b GDEFTable<'b>>,
        stream: &'b mut GlyphStream,
    ) -> ApplyContext<'a, 'b, T> {
        ApplyContext {
            table,
            opt_gdef_table,
            stream,
            match_type: MatchType::match_all(),
        }
    }

    /// Apply lookup `lookup_index` at the current glyph.
    ///
    /// `context_length` bounds how far past the current glyph the lookup may match. Returns
    /// `false` if the budget is exhausted, the lookup does not exist, the lookup skips the
    /// current glyph or none of its subtables apply.
    pub fn apply_lookup(
        &mut self,
        lookup_index: usize,
        context_length: usize,
        nesting_budget: usize,
    ) -> bool {
        if nesting_budget == 0 {
            debug!("nesting limit reached applying lookup {}", lookup_index);
            return false;
        }
        let table = self.table;
        let lookup = match table.lookup(lookup_index) {
            Some(lookup) => lookup,
            None => {
                debug!("lookup {} is missing", lookup_index);
                return false;
            }
        };

        let parent_match_type = self.match_type;
        self.match_type =
            MatchType::from_lookup_flag(lookup.lookup_flag, lookup.opt_mark_filtering_set);
        let skipped = self
            .stream
            .cur()
            .map_or(true, |glyph| self.match_type.skip_glyph(self.opt_gdef_table, glyph));
        let applied = !skipped && T::apply_subtables(self, lookup, context_length, nesting_budget);
        self.match_type = parent_match_type;
        applied
    }

    /// Apply a contextual subtable at the current glyph.
    pub fn context_lookup(
        &mut self,
        subtable: &ContextLookup<'_>,
        context_length: usize,
        nesting_budget: usize,
    ) -> bool {
        let glyph = match self.stream.current_glyph() {
            Some(glyph) => glyph,
            None => return false,
        };
        let match_type = self.match_type;
        let opt_gdef_table = self.opt_gdef_table;
        let stream = &*self.stream;
        let opt_rule = context_lookup_info(subtable, glyph, |match_context| {
            match_type.match_input(
                opt_gdef_table,
                stream,
                context_length,
                &match_context.input_table,
            )
        });
        match opt_rule {
            Some((rule, match_length)) => self.apply_lookup_records(
                rule.match_context.input_table.len() + 1,
                rule.lookup_records,
                match_length,
                nesting_budget,
            ),
            None => false,
        }
    }

    /// Apply a chaining contextual subtable at the current glyph.
    pub fn chain_context_lookup(
        &mut self,
        subtable: &ChainContextLookup<'_>,
        context_length: usize,
        nesting_budget: usize,
    ) -> bool {
        let glyph = match self.stream.current_glyph() {
            Some(glyph) => glyph,
            None => return false,
        };
        let match_type = self.match_type;
        let opt_gdef_table = self.opt_gdef_table;
        let stream = &*self.stream;
        let opt_rule = chain_context_lookup_info(subtable, glyph, |match_context| {
            match_chain(
                match_type,
                opt_gdef_table,
                stream,
                context_length,
                match_context,
            )
        });
        match opt_rule {
            Some((rule, match_length)) => self.apply_lookup_records(
                rule.match_context.input_table.len() + 1,
                rule.lookup_records,
                match_length,
                nesting_budget,
            ),
            None => false,
        }
    }

    /// Walk a matched input window of `count` glyphs spanning `match_length` stream positions,
    /// applying `lookup_records` at their sequence indices.
    ///
    /// Glyphs the current lookup skips are copied through without counting towards `count`.
    /// Records are applied in sequence index order. Returns `false` only if the window does not
    /// fit in the remaining input.
    pub fn apply_lookup_records(
        &mut self,
        count: usize,
        lookup_records: ReadArray<'_, LookupRecord>,
        match_length: usize,
        nesting_budget: usize,
    ) -> bool {
        let end = self
            .stream
            .len()
            .min(self.stream.in_pos().saturating_add(match_length));
        if self.stream.in_pos().saturating_add(count) > end {
            return false;
        }

        let mut records: TinyVec<[LookupRecord; 8]> = lookup_records.iter().collect();
        records.sort_by_key(|record| record.sequence_index);
        let mut pending = records.iter().peekable();

        let mut i = 0;
        while i < count {
            loop {
                if self.stream.in_pos() >= end {
                    return true;
                }
                if !self.current_glyph_skipped() {
                    break;
                }
                self.stream.next_glyph();
            }

            while let Some(record) =
                pending.next_if(|record| usize::from(record.sequence_index) < i)
            {
                debug!(
                    "dropping lookup record for passed sequence index {}",
                    record.sequence_index
                );
            }

            let mut applied = false;
            if let Some(record) = pending.next_if(|record| usize::from(record.sequence_index) == i)
            {
                let in_pos = self.stream.in_pos();
                let done = self.apply_lookup(
                    usize::from(record.lookup_list_index),
                    end - in_pos,
                    nesting_budget.saturating_sub(1),
                );
                let consumed = self.stream.in_pos().saturating_sub(in_pos);
                i += consumed;
                if self.stream.in_pos() >= end {
                    return true;
                }
                // A lookup that applied without consuming anything is stepped over like one
                // that did not apply
                applied = done && consumed > 0;
            }
            if !applied {
                self.stream.next_glyph();
                i += 1;
            }
        }
        true
    }

    fn current_glyph_skipped(&self) -> bool {
        self.stream
            .cur()
            .is_some_and(|glyph| self.match_type.skip_glyph(self.opt_gdef_table, glyph))
    }
}

/// Match a chaining rule at the current glyph, returning the length of input matched.
fn match_chain(
    match_type: MatchType,
    opt_gdef_table: Option<&GDEFTable<'_>>,
    stream: &GlyphStream,
    context_length: usize,
    match_context: &MatchContext<'_>,
) -> Option<usize> {
    let backtrack_count = match_context.backtrack_table.len();
    let input_count = match_context.input_table.len() + 1;
    let lookahead_count = match_context.lookahead_table.len();

    // Rule out rules that cannot fit before comparing any glyphs
    if stream.out_pos() < backtrack_count
        || stream.in_pos() + input_count + lookahead_count > stream.len()
        || input_count + lookahead_count > context_length
    {
        return None;
    }

    if !match_type.match_backtrack(opt_gdef_table, stream, &match_context.backtrack_table) {
        return None;
    }
    let match_length = match_type.match_input(
        opt_gdef_table,
        stream,
        context_length,
        &match_context.input_table,
    )?;
    if !match_type.match_lookahead(
        opt_gdef_table,
        stream,
        context_length,
        &match_context.lookahead_table,
        match_length,
    ) {
        return None;
    }
    Some(match_length)
}
