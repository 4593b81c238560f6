#![warn(rust_2018_idioms)]

//! Matching and application of OpenType contextual lookups.
//!
//! Lookups from the `GSUB` and `GPOS` tables are applied to a [buffer::GlyphStream]. Contextual
//! and chaining contextual lookups match a window of glyphs around the cursor, honouring the
//! skip rules of their lookup flag, and then apply nested lookups inside that window.

pub mod apply;
/// Reading of binary data.
pub mod binary;
pub mod buffer;
pub mod context;
pub mod error;
pub mod gdef;
pub mod gpos;
pub mod gsub;
pub mod layout;
pub mod size;
pub mod tag;
