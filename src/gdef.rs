//! `gdef` font table utilities.
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/gdef>

use crate::layout::GDEFTable;

pub const GLYPH_CLASS_NONE: u16 = 0;
pub const GLYPH_CLASS_BASE: u16 = 1;
pub const GLYPH_CLASS_LIGATURE: u16 = 2;
pub const GLYPH_CLASS_MARK: u16 = 3;
pub const GLYPH_CLASS_COMPONENT: u16 = 4;

pub fn glyph_class(opt_gdef_table: Option<&GDEFTable<'_>>, glyph: u16) -> u16 {
    opt_gdef_table
        .and_then(|gdef| gdef.opt_glyph_classdef.as_ref())
        .map_or(GLYPH_CLASS_NONE, |glyph_classdef| {
            glyph_classdef.glyph_class_value(glyph)
        })
}

pub fn mark_attach_class(opt_gdef_table: Option<&GDEFTable<'_>>, glyph: u16) -> u16 {
    opt_gdef_table
        .and_then(|gdef| gdef.opt_mark_attach_classdef.as_ref())
        .map_or(GLYPH_CLASS_NONE, |mark_attach_classdef| {
            mark_attach_classdef.glyph_class_value(glyph)
        })
}

/// Is `glyph` in mark glyph set `set_index`? A missing set covers nothing.
pub fn mark_glyph_set_covers(
    opt_gdef_table: Option<&GDEFTable<'_>>,
    set_index: u16,
    glyph: u16,
) -> bool {
    opt_gdef_table
        .and_then(|gdef| gdef.opt_mark_glyph_sets.as_ref())
        .and_then(|mark_glyph_sets| mark_glyph_sets.get(usize::from(set_index)))
        .is_some_and(|mark_set| mark_set.glyph_coverage_value(glyph).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::read::ReadScope;
    use crate::tests::writer::{self, TtfType::*};

    fn gdef_data() -> Vec<u8> {
        writer::convert(&[
            UInt16(1),  // major version
            UInt16(2),  // minor version
            UInt16(14), // glyph classdef offset
            UInt16(0),  // attach list offset
            UInt16(0),  // lig caret list offset
            UInt16(26), // mark attach classdef offset
            UInt16(38), // mark glyph sets offset
            // Glyph ClassDef, format 1: glyphs 1..=4
            UInt16(1),
            UInt16(1),
            UInt16(4),
            UInt16(GLYPH_CLASS_BASE),
            UInt16(GLYPH_CLASS_LIGATURE),
            UInt16(GLYPH_CLASS_MARK),
            UInt16(GLYPH_CLASS_MARK),
            // Mark attach ClassDef, format 1: glyphs 3..=4
            UInt16(1),
            UInt16(3),
            UInt16(2),
            UInt16(1),
            UInt16(2),
            // MarkGlyphSets with one set holding glyph 4
            UInt16(1),
            UInt16(1),
            UInt32(8),
            UInt16(1),
            UInt16(1),
            UInt16(4),
        ])
    }

    #[test]
    fn classes_from_gdef() {
        let data = gdef_data();
        let gdef = ReadScope::new(&data).read::<GDEFTable<'_>>().unwrap();
        assert_eq!(glyph_class(Some(&gdef), 1), GLYPH_CLASS_BASE);
        assert_eq!(glyph_class(Some(&gdef), 3), GLYPH_CLASS_MARK);
        assert_eq!(glyph_class(Some(&gdef), 9), GLYPH_CLASS_NONE);
        assert_eq!(glyph_class(None, 1), GLYPH_CLASS_NONE);
        assert_eq!(mark_attach_class(Some(&gdef), 4), 2);
    }

    #[test]
    fn mark_glyph_set_membership() {
        let data = gdef_data();
        let gdef = ReadScope::new(&data).read::<GDEFTable<'_>>().unwrap();
        assert!(mark_glyph_set_covers(Some(&gdef), 0, 4));
        assert!(!mark_glyph_set_covers(Some(&gdef), 0, 3));
        assert!(!mark_glyph_set_covers(Some(&gdef), 1, 4));
        assert!(!mark_glyph_set_covers(None, 0, 4));
    }
}
