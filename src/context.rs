//! Utilities for performing contextual lookup in gpos and gsub.

use bitflags::bitflags;

use crate::binary::read::ReadArray;
use crate::binary::U16Be;
use crate::buffer::{Direction, GlyphInfo, GlyphProps, GlyphStream};
use crate::gdef;
use crate::layout::{ClassDef, Coverage, GDEFTable, LookupRecord, OffsetArray};

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct LookupFlag: u16 {
        const RIGHT_TO_LEFT = 0x0001;
        const IGNORE_BASE_GLYPHS = 0x0002;
        const IGNORE_LIGATURES = 0x0004;
        const IGNORE_MARKS = 0x0008;
        const USE_MARK_FILTERING_SET = 0x0010;
        const MARK_ATTACHMENT_TYPE = 0xFF00;
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum IgnoreMarks {
    NoIgnoreMarks,
    IgnoreAllMarks,
    IgnoreMarksExcept(u8),
    IgnoreMarksNotInSet(u16),
}

/// Which glyphs a lookup treats as transparent.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct MatchType {
    ignore_bases: bool,
    ignore_ligatures: bool,
    ignore_marks: IgnoreMarks,
}

/// The criteria one part of a rule matches glyphs against.
#[derive(Copy, Clone)]
pub enum GlyphTable<'a> {
    Empty,
    ById(ReadArray<'a, U16Be>),
    ByClassDef(&'a ClassDef<'a>, ReadArray<'a, U16Be>),
    ByCoverage(OffsetArray<'a, Coverage<'a>>),
}

impl<'a> GlyphTable<'a> {
    pub fn len(&self) -> usize {
        match self {
            GlyphTable::Empty => 0,
            GlyphTable::ById(arr) => arr.len(),
            GlyphTable::ByClassDef(_, arr) => arr.len(),
            GlyphTable::ByCoverage(coverages) => coverages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Does `glyph` satisfy the `i`th criterion? Out of range never matches.
    pub fn matches(&self, i: usize, glyph: u16) -> bool {
        match *self {
            GlyphTable::Empty => false,
            GlyphTable::ById(ref arr) => arr
                .get_item(i)
                .is_some_and(|value| match_glyph(glyph, value)),
            GlyphTable::ByClassDef(classdef, ref arr) => arr
                .get_item(i)
                .is_some_and(|value| match_class(glyph, value, classdef)),
            GlyphTable::ByCoverage(ref coverages) => coverages
                .get(i)
                .is_some_and(|coverage| match_coverage(glyph, &coverage)),
        }
    }
}

pub struct MatchContext<'a> {
    pub backtrack_table: GlyphTable<'a>,
    pub input_table: GlyphTable<'a>,
    pub lookahead_table: GlyphTable<'a>,
}

/// A rule selected for the current glyph: what it matches and the lookups it applies.
pub struct ContextLookupHelper<'a> {
    pub match_context: MatchContext<'a>,
    pub lookup_records: ReadArray<'a, LookupRecord>,
}

impl<'a> ContextLookupHelper<'a> {
    pub fn new(
        match_context: MatchContext<'a>,
        lookup_records: ReadArray<'a, LookupRecord>,
    ) -> ContextLookupHelper<'a> {
        ContextLookupHelper {
            match_context,
            lookup_records,
        }
    }
}

impl<'a> MatchContext<'a> {
    /// An input-only context, as used by plain contextual lookups.
    pub fn input(input_table: GlyphTable<'a>) -> MatchContext<'a> {
        MatchContext {
            backtrack_table: GlyphTable::Empty,
            input_table,
            lookahead_table: GlyphTable::Empty,
        }
    }
}

pub fn match_glyph(glyph: u16, value: u16) -> bool {
    glyph == value
}

pub fn match_class(glyph: u16, value: u16, classdef: &ClassDef<'_>) -> bool {
    classdef.glyph_class_value(glyph) == value
}

pub fn match_coverage(glyph: u16, coverage: &Coverage<'_>) -> bool {
    coverage.glyph_coverage_value(glyph).is_some()
}

impl LookupFlag {
    pub fn get_ignore_bases(self) -> bool {
        self.contains(LookupFlag::IGNORE_BASE_GLYPHS)
    }

    pub fn get_ignore_ligatures(self) -> bool {
        self.contains(LookupFlag::IGNORE_LIGATURES)
    }

    pub fn get_use_mark_filtering_set(self) -> bool {
        self.contains(LookupFlag::USE_MARK_FILTERING_SET)
    }

    pub fn get_mark_attachment_type(self) -> u8 {
        (self.bits() >> 8) as u8
    }

    /// `opt_mark_filtering_set` is the set index stored in the lookup, present when
    /// `USE_MARK_FILTERING_SET` is set.
    pub fn get_ignore_marks(self, opt_mark_filtering_set: Option<u16>) -> IgnoreMarks {
        if self.contains(LookupFlag::IGNORE_MARKS) {
            IgnoreMarks::IgnoreAllMarks
        } else if let (true, Some(set_index)) =
            (self.get_use_mark_filtering_set(), opt_mark_filtering_set)
        {
            IgnoreMarks::IgnoreMarksNotInSet(set_index)
        } else if self.get_mark_attachment_type() != 0 {
            IgnoreMarks::IgnoreMarksExcept(self.get_mark_attachment_type())
        } else {
            IgnoreMarks::NoIgnoreMarks
        }
    }
}

impl MatchType {
    /// Skips nothing.
    pub fn match_all() -> MatchType {
        MatchType {
            ignore_bases: false,
            ignore_ligatures: false,
            ignore_marks: IgnoreMarks::NoIgnoreMarks,
        }
    }

    pub fn ignore_marks() -> MatchType {
        MatchType {
            ignore_bases: false,
            ignore_ligatures: false,
            ignore_marks: IgnoreMarks::IgnoreAllMarks,
        }
    }

    pub fn from_lookup_flag(
        lookup_flag: LookupFlag,
        opt_mark_filtering_set: Option<u16>,
    ) -> MatchType {
        MatchType {
            ignore_bases: lookup_flag.get_ignore_bases(),
            ignore_ligatures: lookup_flag.get_ignore_ligatures(),
            ignore_marks: lookup_flag.get_ignore_marks(opt_mark_filtering_set),
        }
    }

    /// Is `glyph` transparent to matching?
    pub fn skip_glyph(self, opt_gdef_table: Option<&GDEFTable<'_>>, glyph: &GlyphInfo) -> bool {
        let props = glyph.props;
        if self.ignore_bases && props.contains(GlyphProps::BASE_GLYPH) {
            return true;
        }
        if self.ignore_ligatures && props.contains(GlyphProps::LIGATURE) {
            return true;
        }
        if !props.contains(GlyphProps::MARK) {
            return false;
        }
        match self.ignore_marks {
            IgnoreMarks::NoIgnoreMarks => false,
            IgnoreMarks::IgnoreAllMarks => true,
            IgnoreMarks::IgnoreMarksExcept(keep_class) => {
                props.mark_attachment_type() != keep_class
            }
            IgnoreMarks::IgnoreMarksNotInSet(set_index) => {
                !gdef::mark_glyph_set_covers(opt_gdef_table, set_index, glyph.glyph_index)
            }
        }
    }

    /// Match `table` against the output, backwards from `out_pos - 1`.
    pub fn match_backtrack(
        self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        stream: &GlyphStream,
        table: &GlyphTable<'_>,
    ) -> bool {
        let count = table.len();
        if stream.out_pos() < count {
            return false;
        }
        let mut j = stream.out_pos();
        for i in 0..count {
            // At least `count - i` glyphs remain below `j`
            let found = stream.skip_to_matchable(
                Direction::Backward,
                self,
                opt_gdef_table,
                j - 1,
                count - i - 1,
            );
            j = match found {
                Some(j) => j,
                None => return false,
            };
            match stream.output_glyph(j) {
                Some(info) if table.matches(i, info.glyph_index) => {}
                _ => return false,
            }
        }
        true
    }

    /// Match `table` against the input following the glyph at `in_pos`.
    ///
    /// The glyph at `in_pos` is not matched. On success returns the number of input positions
    /// the match spanned, counting `in_pos` itself and any skipped glyphs.
    pub fn match_input(
        self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        stream: &GlyphStream,
        context_length: usize,
        table: &GlyphTable<'_>,
    ) -> Option<usize> {
        let count = table.len() + 1;
        let in_pos = stream.in_pos();
        let end = stream.len().min(in_pos.saturating_add(context_length));
        if in_pos.checked_add(count)? > end {
            return None;
        }
        let mut j = in_pos + 1;
        for i in 1..count {
            let limit = end + i + 1 - count;
            j = stream.skip_to_matchable(Direction::Forward, self, opt_gdef_table, j, limit)?;
            let glyph = stream.input_glyph(j)?.glyph_index;
            if !table.matches(i - 1, glyph) {
                return None;
            }
            j += 1;
        }
        Some(j - in_pos)
    }

    /// Match `table` against the input starting `offset` positions after `in_pos`.
    pub fn match_lookahead(
        self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        stream: &GlyphStream,
        context_length: usize,
        table: &GlyphTable<'_>,
        offset: usize,
    ) -> bool {
        let count = table.len();
        let in_pos = stream.in_pos();
        let end = stream.len().min(in_pos.saturating_add(context_length));
        if in_pos.saturating_add(offset).saturating_add(count) > end {
            return false;
        }
        let mut j = in_pos + offset;
        for i in 0..count {
            let limit = end + i + 1 - count;
            let found =
                stream.skip_to_matchable(Direction::Forward, self, opt_gdef_table, j, limit);
            j = match found {
                Some(j) => j,
                None => return false,
            };
            match stream.input_glyph(j) {
                Some(info) if table.matches(i, info.glyph_index) => {}
                _ => return false,
            }
            j += 1;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::read::ReadScope;
    use crate::buffer::GlyphInfo;

    const NO_LIMIT: usize = usize::MAX;

    fn glyphs(ids: &[u16]) -> Vec<u8> {
        ids.iter().flat_map(|id| id.to_be_bytes()).collect()
    }

    fn stream(glyphs: &[(u16, GlyphProps)]) -> GlyphStream {
        GlyphStream::new(
            glyphs
                .iter()
                .zip(0..)
                .map(|(&(glyph_index, props), cluster)| GlyphInfo::new(glyph_index, props, cluster))
                .collect(),
        )
    }

    #[test]
    fn lookup_flag_ignore_marks() {
        let flag = LookupFlag::from_bits_retain(0x0300);
        assert_eq!(flag.get_ignore_marks(None), IgnoreMarks::IgnoreMarksExcept(3));
        let flag = LookupFlag::IGNORE_MARKS | LookupFlag::from_bits_retain(0x0300);
        assert_eq!(flag.get_ignore_marks(None), IgnoreMarks::IgnoreAllMarks);
        let flag = LookupFlag::USE_MARK_FILTERING_SET;
        assert_eq!(flag.get_ignore_marks(Some(2)), IgnoreMarks::IgnoreMarksNotInSet(2));
    }

    #[test]
    fn skip_glyph_by_attachment_type() {
        let match_type = MatchType::from_lookup_flag(LookupFlag::from_bits_retain(0x0100), None);
        let class1 = GlyphInfo::new(1, GlyphProps::MARK | GlyphProps::from_bits_retain(0x0100), 0);
        let class2 = GlyphInfo::new(2, GlyphProps::MARK | GlyphProps::from_bits_retain(0x0200), 0);
        let base = GlyphInfo::new(3, GlyphProps::BASE_GLYPH, 0);
        assert!(!match_type.skip_glyph(None, &class1));
        assert!(match_type.skip_glyph(None, &class2));
        assert!(!match_type.skip_glyph(None, &base));
    }

    #[test]
    fn match_input_spans_skipped_marks() {
        let data = glyphs(&[2]);
        let input = ReadScope::new(&data).ctxt().read_array::<U16Be>(1).unwrap();
        let table = GlyphTable::ById(input);
        let stream = stream(&[
            (1, GlyphProps::BASE_GLYPH),
            (9, GlyphProps::MARK),
            (2, GlyphProps::BASE_GLYPH),
        ]);
        let match_type = MatchType::ignore_marks();
        assert_eq!(match_type.match_input(None, &stream, NO_LIMIT, &table), Some(3));
        // The window ends before the second component
        assert_eq!(match_type.match_input(None, &stream, 2, &table), None);
        // Marks count when they are not ignored
        let no_skip = MatchType::from_lookup_flag(LookupFlag::empty(), None);
        assert_eq!(no_skip.match_input(None, &stream, NO_LIMIT, &table), None);
    }

    #[test]
    fn match_lookahead_from_offset() {
        let data = glyphs(&[7]);
        let lookahead = ReadScope::new(&data).ctxt().read_array::<U16Be>(1).unwrap();
        let table = GlyphTable::ById(lookahead);
        let stream = stream(&[
            (1, GlyphProps::empty()),
            (9, GlyphProps::MARK),
            (2, GlyphProps::empty()),
            (7, GlyphProps::empty()),
        ]);
        let match_type = MatchType::ignore_marks();
        assert!(match_type.match_lookahead(None, &stream, NO_LIMIT, &table, 3));
        assert!(!match_type.match_lookahead(None, &stream, NO_LIMIT, &table, 2));
        assert!(!match_type.match_lookahead(None, &stream, 3, &table, 3));
    }

    #[test]
    fn match_backtrack_needs_output() {
        let data = glyphs(&[1]);
        let backtrack = ReadScope::new(&data).ctxt().read_array::<U16Be>(1).unwrap();
        let table = GlyphTable::ById(backtrack);
        let mut stream = stream(&[
            (1, GlyphProps::empty()),
            (9, GlyphProps::MARK),
            (2, GlyphProps::empty()),
        ]);
        let match_type = MatchType::ignore_marks();
        stream.clear_output();
        assert!(!match_type.match_backtrack(None, &stream, &table));
        stream.next_glyph();
        stream.next_glyph();
        assert!(match_type.match_backtrack(None, &stream, &table));
    }

    #[test]
    fn empty_table_never_matches() {
        assert!(!GlyphTable::Empty.matches(0, 1));
    }
}
