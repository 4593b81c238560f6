//! The glyph stream that lookups are applied to.
//!
//! A substitution pass reads glyphs from an input sequence and appends the glyphs it produces to
//! a separate output sequence. Two cursors track the pass: `in_pos`, the next unconsumed input
//! glyph, and `out_pos`, the end of the output. Backtrack context is read from the output, since
//! glyphs before the cursor may already have been rewritten during the pass. Input and lookahead
//! context are read from the input. A positioning pass runs in place: only `in_pos` moves and
//! the glyphs before it stand in for the output.

use bitflags::bitflags;

use crate::context::MatchType;
use crate::gdef;
use crate::layout::GDEFTable;

bitflags! {
    /// Cached glyph properties used to decide whether a lookup skips a glyph.
    ///
    /// The class bits line up with the `IGNORE_*` bits of a lookup flag and the high byte holds
    /// the mark attachment class.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct GlyphProps: u16 {
        const BASE_GLYPH = 0x0002;
        const LIGATURE = 0x0004;
        const MARK = 0x0008;
        const COMPONENT = 0x0010;
        const MARK_ATTACHMENT_TYPE = 0xFF00;
    }
}

impl Default for GlyphProps {
    fn default() -> Self {
        GlyphProps::empty()
    }
}

impl GlyphProps {
    /// Compute the properties of `glyph` from the glyph class definitions in `GDEF`.
    pub fn from_gdef(opt_gdef_table: Option<&GDEFTable<'_>>, glyph: u16) -> GlyphProps {
        match gdef::glyph_class(opt_gdef_table, glyph) {
            gdef::GLYPH_CLASS_BASE => GlyphProps::BASE_GLYPH,
            gdef::GLYPH_CLASS_LIGATURE => GlyphProps::LIGATURE,
            gdef::GLYPH_CLASS_MARK => {
                let attach_class = gdef::mark_attach_class(opt_gdef_table, glyph) & 0xFF;
                GlyphProps::MARK | GlyphProps::from_bits_retain(attach_class << 8)
            }
            gdef::GLYPH_CLASS_COMPONENT => GlyphProps::COMPONENT,
            _ => GlyphProps::empty(),
        }
    }

    pub fn mark_attachment_type(self) -> u8 {
        (self.bits() >> 8) as u8
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct GlyphInfo {
    pub glyph_index: u16,
    pub props: GlyphProps,
    /// Position of the input glyph this glyph originated from.
    pub cluster: u32,
}

/// Adjustments accumulated by positioning lookups, in font units.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct GlyphPosition {
    pub x_advance: i32,
    pub y_advance: i32,
    pub x_offset: i32,
    pub y_offset: i32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Ahead of the cursor, in the input.
    Forward,
    /// Behind the cursor, in the output.
    Backward,
}

#[derive(Debug, Clone, Default)]
pub struct GlyphStream {
    info: Vec<GlyphInfo>,
    out_info: Vec<GlyphInfo>,
    pos: Vec<GlyphPosition>,
    idx: usize,
    have_output: bool,
}

impl GlyphInfo {
    pub fn new(glyph_index: u16, props: GlyphProps, cluster: u32) -> GlyphInfo {
        GlyphInfo {
            glyph_index,
            props,
            cluster,
        }
    }
}

impl GlyphStream {
    pub fn new(glyphs: Vec<GlyphInfo>) -> GlyphStream {
        let pos = vec![GlyphPosition::default(); glyphs.len()];
        GlyphStream {
            info: glyphs,
            out_info: Vec::new(),
            pos,
            idx: 0,
            have_output: false,
        }
    }

    /// Build a stream from bare glyph ids, numbering clusters by position.
    pub fn from_glyph_ids(glyph_ids: &[u16]) -> GlyphStream {
        let glyphs = glyph_ids
            .iter()
            .zip(0..)
            .map(|(&glyph_index, cluster)| {
                GlyphInfo::new(glyph_index, GlyphProps::empty(), cluster)
            })
            .collect();
        GlyphStream::new(glyphs)
    }

    /// Recompute the cached properties of every input glyph from `GDEF`.
    pub fn set_glyph_props(&mut self, opt_gdef_table: Option<&GDEFTable<'_>>) {
        for info in &mut self.info {
            info.props = GlyphProps::from_gdef(opt_gdef_table, info.glyph_index);
        }
    }

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn in_pos(&self) -> usize {
        self.idx
    }

    pub fn out_pos(&self) -> usize {
        if self.have_output {
            self.out_info.len()
        } else {
            self.idx
        }
    }

    pub fn have_output(&self) -> bool {
        self.have_output
    }

    pub fn remaining_input(&self) -> usize {
        self.info.len().saturating_sub(self.idx)
    }

    /// The glyph at `in_pos`.
    pub fn cur(&self) -> Option<&GlyphInfo> {
        self.info.get(self.idx)
    }

    pub fn current_glyph(&self) -> Option<u16> {
        self.cur().map(|info| info.glyph_index)
    }

    pub fn input_glyph(&self, index: usize) -> Option<&GlyphInfo> {
        self.info.get(index)
    }

    /// The glyph at `index` in the output, or in the consumed input when running in place.
    pub fn output_glyph(&self, index: usize) -> Option<&GlyphInfo> {
        if index >= self.out_pos() {
            return None;
        }
        if self.have_output {
            self.out_info.get(index)
        } else {
            self.info.get(index)
        }
    }

    /// Read `offset` glyphs ahead of `in_pos` or behind `out_pos`.
    pub fn glyph_at(&self, direction: Direction, offset: usize) -> Option<&GlyphInfo> {
        match direction {
            Direction::Forward => self.input_glyph(self.idx.checked_add(offset)?),
            Direction::Backward => {
                let index = self.out_pos().checked_sub(offset.checked_add(1)?)?;
                self.output_glyph(index)
            }
        }
    }

    /// Scan from `index` for the first glyph `match_type` does not skip.
    ///
    /// Forward scans read the input from `index` up to, but not including, `limit`. Backward
    /// scans read the output from `index` down to and including `limit`. `None` means the
    /// boundary was reached. Nothing is consumed either way.
    pub fn skip_to_matchable(
        &self,
        direction: Direction,
        match_type: MatchType,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        mut index: usize,
        limit: usize,
    ) -> Option<usize> {
        match direction {
            Direction::Forward => {
                while index < limit {
                    let info = self.input_glyph(index)?;
                    if !match_type.skip_glyph(opt_gdef_table, info) {
                        return Some(index);
                    }
                    index += 1;
                }
                None
            }
            Direction::Backward => loop {
                if index < limit {
                    return None;
                }
                let info = self.output_glyph(index)?;
                if !match_type.skip_glyph(opt_gdef_table, info) {
                    return Some(index);
                }
                index = index.checked_sub(1)?;
            },
        }
    }

    /// Copy the current glyph to the output and advance.
    pub fn next_glyph(&mut self) {
        if self.have_output {
            if let Some(info) = self.info.get(self.idx) {
                self.out_info.push(*info);
            }
        }
        if self.idx < self.info.len() {
            self.idx += 1;
        }
    }

    /// Consume the current glyph, producing `info` in its place.
    pub fn replace_glyph(&mut self, info: GlyphInfo) {
        self.replace_glyphs(1, [info]);
    }

    /// Consume `num_in` input glyphs, producing `infos` in their place.
    ///
    /// In place the replacements are spliced into the input and the cursor moves past them.
    pub fn replace_glyphs<I>(&mut self, num_in: usize, infos: I)
    where
        I: IntoIterator<Item = GlyphInfo>,
    {
        let end = self.idx.saturating_add(num_in).min(self.info.len());
        if self.have_output {
            self.out_info.extend(infos);
            self.idx = end;
        } else {
            let start = self.idx;
            let before = self.info.len();
            self.info.splice(start..end, infos);
            let num_out = self.info.len() + (end - start) - before;
            self.pos.splice(
                start..end,
                std::iter::repeat(GlyphPosition::default()).take(num_out),
            );
            self.idx = start + num_out;
        }
    }

    /// Adjustments of the glyph at `index` in the input.
    pub fn position_mut(&mut self, index: usize) -> Option<&mut GlyphPosition> {
        self.pos.get_mut(index)
    }

    pub fn positions(&self) -> &[GlyphPosition] {
        &self.pos
    }

    /// Start a pass that writes to the output.
    pub fn clear_output(&mut self) {
        self.have_output = true;
        self.out_info.clear();
        self.idx = 0;
    }

    /// Finish a pass started with `clear_output`. The output becomes the input of the next pass.
    pub fn swap_buffers(&mut self) {
        if self.have_output {
            // Glyphs after the cursor were never reached and pass through unchanged.
            let rest = self.info.get(self.idx..).unwrap_or(&[]);
            self.out_info.extend_from_slice(rest);
            std::mem::swap(&mut self.info, &mut self.out_info);
            self.out_info.clear();
            self.pos = vec![GlyphPosition::default(); self.info.len()];
        }
        self.have_output = false;
        self.idx = 0;
    }

    /// Start an in-place pass at the beginning of the input.
    pub fn rewind(&mut self) {
        self.have_output = false;
        self.out_info.clear();
        self.idx = 0;
    }

    /// Reset every adjustment and start an in-place pass.
    pub fn clear_positions(&mut self) {
        self.pos.clear();
        self.pos.resize(self.info.len(), GlyphPosition::default());
        self.rewind();
    }

    /// The input sequence.
    pub fn input(&self) -> &[GlyphInfo] {
        &self.info
    }

    /// The output produced so far, or the consumed input when running in place.
    pub fn output(&self) -> &[GlyphInfo] {
        if self.have_output {
            &self.out_info
        } else {
            &self.info[..self.idx]
        }
    }

    pub fn glyph_ids(&self) -> Vec<u16> {
        self.info.iter().map(|info| info.glyph_index).collect()
    }
}
