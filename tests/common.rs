// Builders for the layout structures used in tests.
//
// Each builder returns a serialised structure followed by the structures it references, with
// offsets relative to its own start.

pub const LOOKUP_FLAG_IGNORE_LIGATURES: u16 = 0x0004;
pub const LOOKUP_FLAG_IGNORE_MARKS: u16 = 0x0008;
pub const LOOKUP_FLAG_USE_MARK_FILTERING_SET: u16 = 0x0010;

/// A field of a structure being built.
pub enum Field {
    U16(u16),
    I16(i16),
    U32(u32),
    /// A zero 16-bit offset.
    Null16,
    Offset16(Vec<u8>),
    Offset32(Vec<u8>),
}

impl Field {
    fn size(&self) -> usize {
        match self {
            Field::U16(_) | Field::I16(_) | Field::Null16 | Field::Offset16(_) => 2,
            Field::U32(_) | Field::Offset32(_) => 4,
        }
    }
}

/// Serialise `fields`, placing referenced structures after them in field order.
pub fn table(fields: Vec<Field>) -> Vec<u8> {
    let header_size: usize = fields.iter().map(Field::size).sum();
    let mut data = Vec::with_capacity(header_size);
    let mut children = Vec::new();
    for field in fields {
        match field {
            Field::U16(value) => data.extend_from_slice(&value.to_be_bytes()),
            Field::I16(value) => data.extend_from_slice(&value.to_be_bytes()),
            Field::U32(value) => data.extend_from_slice(&value.to_be_bytes()),
            Field::Null16 => data.extend_from_slice(&0u16.to_be_bytes()),
            Field::Offset16(child) => {
                let offset = u16::try_from(header_size + children.len()).unwrap();
                data.extend_from_slice(&offset.to_be_bytes());
                children.extend(child);
            }
            Field::Offset32(child) => {
                let offset = u32::try_from(header_size + children.len()).unwrap();
                data.extend_from_slice(&offset.to_be_bytes());
                children.extend(child);
            }
        }
    }
    data.extend(children);
    data
}

fn u16_fields(values: &[u16]) -> impl Iterator<Item = Field> + '_ {
    values.iter().map(|&value| Field::U16(value))
}

fn count(len: usize) -> Field {
    Field::U16(u16::try_from(len).unwrap())
}

fn lookup_record_fields(records: &[(u16, u16)]) -> Vec<Field> {
    let mut fields = vec![count(records.len())];
    fields.extend(
        records
            .iter()
            .flat_map(|&(sequence_index, lookup_index)| {
                [Field::U16(sequence_index), Field::U16(lookup_index)]
            }),
    );
    fields
}

/// Coverage format 1. `glyphs` must be sorted.
pub fn coverage(glyphs: &[u16]) -> Vec<u8> {
    let mut fields = vec![Field::U16(1), count(glyphs.len())];
    fields.extend(u16_fields(glyphs));
    table(fields)
}

/// Coverage format 2 with a single range.
pub fn coverage_range(start_glyph: u16, end_glyph: u16) -> Vec<u8> {
    table(vec![
        Field::U16(2),
        Field::U16(1),
        Field::U16(start_glyph),
        Field::U16(end_glyph),
        Field::U16(0),
    ])
}

/// ClassDef format 2 with one single-glyph range per `(glyph, class)`. Glyphs must be sorted.
pub fn classdef(glyph_classes: &[(u16, u16)]) -> Vec<u8> {
    let mut fields = vec![Field::U16(2), count(glyph_classes.len())];
    fields.extend(
        glyph_classes
            .iter()
            .flat_map(|&(glyph, class)| [Field::U16(glyph), Field::U16(glyph), Field::U16(class)]),
    );
    table(fields)
}

/// SingleSubst format 2 mapping each `(from, to)`. Sources must be sorted.
pub fn single_subst(mapping: &[(u16, u16)]) -> Vec<u8> {
    let sources = mapping.iter().map(|&(from, _)| from).collect::<Vec<_>>();
    let mut fields = vec![
        Field::U16(2),
        Field::Offset16(coverage(&sources)),
        count(mapping.len()),
    ];
    fields.extend(mapping.iter().map(|&(_, to)| Field::U16(to)));
    table(fields)
}

/// SingleSubst format 1 adding `delta` to each of `glyphs`.
pub fn single_subst_delta(glyphs: &[u16], delta: i16) -> Vec<u8> {
    table(vec![
        Field::U16(1),
        Field::Offset16(coverage(glyphs)),
        Field::I16(delta),
    ])
}

/// MultipleSubst replacing `glyph` with `sequence`.
pub fn multiple_subst(glyph: u16, sequence: &[u16]) -> Vec<u8> {
    let mut sequence_fields = vec![count(sequence.len())];
    sequence_fields.extend(u16_fields(sequence));
    table(vec![
        Field::U16(1),
        Field::Offset16(coverage(&[glyph])),
        Field::U16(1),
        Field::Offset16(table(sequence_fields)),
    ])
}

/// LigatureSubst with one ligature set for `first_glyph`, holding `(ligature, components)` in
/// order. Components exclude the first glyph.
pub fn ligature_subst(first_glyph: u16, ligatures: &[(u16, &[u16])]) -> Vec<u8> {
    let mut set_fields = vec![count(ligatures.len())];
    for &(ligature_glyph, components) in ligatures {
        let mut ligature_fields = vec![Field::U16(ligature_glyph), count(components.len() + 1)];
        ligature_fields.extend(u16_fields(components));
        set_fields.push(Field::Offset16(table(ligature_fields)));
    }
    table(vec![
        Field::U16(1),
        Field::Offset16(coverage(&[first_glyph])),
        Field::U16(1),
        Field::Offset16(table(set_fields)),
    ])
}

/// SinglePos format 1 adding `x_advance` to each of `glyphs`.
pub fn single_pos(glyphs: &[u16], x_advance: i16) -> Vec<u8> {
    table(vec![
        Field::U16(1),
        Field::Offset16(coverage(glyphs)),
        Field::U16(0x0004),
        Field::I16(x_advance),
    ])
}

/// A rule with an input sequence, excluding the first glyph, and `(sequence index, lookup index)`
/// records.
pub type ContextRule<'r> = (&'r [u16], &'r [(u16, u16)]);

fn context_rule(input: &[u16], records: &[(u16, u16)]) -> Vec<u8> {
    let mut fields = vec![count(input.len() + 1), count(records.len())];
    fields.extend(u16_fields(input));
    fields.extend(lookup_record_fields(records).into_iter().skip(1));
    table(fields)
}

fn context_rule_set(rules: &[ContextRule<'_>]) -> Vec<u8> {
    let mut fields = vec![count(rules.len())];
    fields.extend(
        rules
            .iter()
            .map(|&(input, records)| Field::Offset16(context_rule(input, records))),
    );
    table(fields)
}

/// Context format 1 with a rule set for `first_glyph`.
pub fn context_glyphs(first_glyph: u16, rules: &[ContextRule<'_>]) -> Vec<u8> {
    table(vec![
        Field::U16(1),
        Field::Offset16(coverage(&[first_glyph])),
        Field::U16(1),
        Field::Offset16(context_rule_set(rules)),
    ])
}

/// Context format 2. Rule set `n` of `class_rules` is for class `n`. An empty set is written as a
/// null offset. Rule inputs are classes.
pub fn context_classes(
    coverage_glyphs: &[u16],
    glyph_classes: &[(u16, u16)],
    class_rules: &[&[ContextRule<'_>]],
) -> Vec<u8> {
    let mut fields = vec![
        Field::U16(2),
        Field::Offset16(coverage(coverage_glyphs)),
        Field::Offset16(classdef(glyph_classes)),
        count(class_rules.len()),
    ];
    fields.extend(class_rules.iter().map(|rules| {
        if rules.is_empty() {
            Field::Null16
        } else {
            Field::Offset16(context_rule_set(rules))
        }
    }));
    table(fields)
}

/// Context format 3 with one coverage per input position.
pub fn context_coverages(coverages: &[&[u16]], records: &[(u16, u16)]) -> Vec<u8> {
    let mut fields = vec![
        Field::U16(3),
        count(coverages.len()),
        count(records.len()),
    ];
    fields.extend(
        coverages
            .iter()
            .map(|glyphs| Field::Offset16(coverage(glyphs))),
    );
    fields.extend(lookup_record_fields(records).into_iter().skip(1));
    table(fields)
}

/// A chaining rule. Backtrack is listed nearest glyph first and input excludes the first glyph.
pub struct ChainRule<'r> {
    pub backtrack: &'r [u16],
    pub input: &'r [u16],
    pub lookahead: &'r [u16],
    pub records: &'r [(u16, u16)],
}

fn chain_rule(rule: &ChainRule<'_>) -> Vec<u8> {
    let mut fields = vec![count(rule.backtrack.len())];
    fields.extend(u16_fields(rule.backtrack));
    fields.push(count(rule.input.len() + 1));
    fields.extend(u16_fields(rule.input));
    fields.push(count(rule.lookahead.len()));
    fields.extend(u16_fields(rule.lookahead));
    fields.extend(lookup_record_fields(rule.records));
    table(fields)
}

fn chain_rule_set(rules: &[ChainRule<'_>]) -> Vec<u8> {
    let mut fields = vec![count(rules.len())];
    fields.extend(rules.iter().map(|rule| Field::Offset16(chain_rule(rule))));
    table(fields)
}

/// ChainContext format 1 with a rule set for `first_glyph`.
pub fn chain_context_glyphs(first_glyph: u16, rules: &[ChainRule<'_>]) -> Vec<u8> {
    table(vec![
        Field::U16(1),
        Field::Offset16(coverage(&[first_glyph])),
        Field::U16(1),
        Field::Offset16(chain_rule_set(rules)),
    ])
}

/// ChainContext format 2 using one class definition for all three sequences. Rule set `n` of
/// `class_rules` is for class `n`, an empty set is written as a null offset.
pub fn chain_context_classes(
    coverage_glyphs: &[u16],
    glyph_classes: &[(u16, u16)],
    class_rules: &[&[ChainRule<'_>]],
) -> Vec<u8> {
    let mut fields = vec![
        Field::U16(2),
        Field::Offset16(coverage(coverage_glyphs)),
        Field::Offset16(classdef(glyph_classes)),
        Field::Offset16(classdef(glyph_classes)),
        Field::Offset16(classdef(glyph_classes)),
        count(class_rules.len()),
    ];
    fields.extend(class_rules.iter().map(|rules| {
        if rules.is_empty() {
            Field::Null16
        } else {
            Field::Offset16(chain_rule_set(rules))
        }
    }));
    table(fields)
}

/// ChainContext format 3 with one coverage per position. Backtrack is listed nearest glyph
/// first.
pub fn chain_context_coverages(
    backtrack: &[&[u16]],
    input: &[&[u16]],
    lookahead: &[&[u16]],
    records: &[(u16, u16)],
) -> Vec<u8> {
    let mut fields = vec![Field::U16(3)];
    for sequence in [backtrack, input, lookahead] {
        fields.push(count(sequence.len()));
        fields.extend(
            sequence
                .iter()
                .map(|glyphs| Field::Offset16(coverage(glyphs))),
        );
    }
    fields.extend(lookup_record_fields(records));
    table(fields)
}

/// Extension subtable format 1 wrapping `subtable` of `lookup_type`.
pub fn extension(lookup_type: u16, subtable: Vec<u8>) -> Vec<u8> {
    table(vec![
        Field::U16(1),
        Field::U16(lookup_type),
        Field::Offset32(subtable),
    ])
}

/// Lookup table. A mark filtering set is written when `lookup_flag` asks for one.
pub fn lookup(
    lookup_type: u16,
    lookup_flag: u16,
    opt_mark_filtering_set: Option<u16>,
    subtables: Vec<Vec<u8>>,
) -> Vec<u8> {
    let mut fields = vec![
        Field::U16(lookup_type),
        Field::U16(lookup_flag),
        count(subtables.len()),
    ];
    fields.extend(subtables.into_iter().map(Field::Offset16));
    if lookup_flag & LOOKUP_FLAG_USE_MARK_FILTERING_SET != 0 {
        fields.push(Field::U16(opt_mark_filtering_set.unwrap_or(0)));
    }
    table(fields)
}

/// Lookup table with no flags.
pub fn simple_lookup(lookup_type: u16, subtables: Vec<Vec<u8>>) -> Vec<u8> {
    lookup(lookup_type, 0, None, subtables)
}

pub fn lookup_list(lookups: Vec<Vec<u8>>) -> Vec<u8> {
    let mut fields = vec![count(lookups.len())];
    fields.extend(lookups.into_iter().map(Field::Offset16));
    table(fields)
}

/// `GSUB` or `GPOS` table 1.0 holding only a lookup list.
pub fn lookups_table(lookups: Vec<Vec<u8>>) -> Vec<u8> {
    table(vec![
        Field::U16(1),
        Field::U16(0),
        Field::Null16,
        Field::Null16,
        Field::Offset16(lookup_list(lookups)),
    ])
}

/// A feature tag with the indices of its lookups.
pub type FeatureDef<'r> = (u32, &'r [u16]);

/// `GSUB` or `GPOS` table 1.0 with one script whose default language system enables every one
/// of `features`. `opt_required` is the index of a feature made the required feature instead.
pub fn features_table(
    script_tag: u32,
    features: &[FeatureDef<'_>],
    opt_required: Option<u16>,
    lookups: Vec<Vec<u8>>,
) -> Vec<u8> {
    let feature_indices = (0..features.len())
        .map(|index| u16::try_from(index).unwrap())
        .filter(|&index| Some(index) != opt_required)
        .collect::<Vec<_>>();
    let mut langsys_fields = vec![
        Field::Null16,
        Field::U16(opt_required.unwrap_or(0xFFFF)),
        count(feature_indices.len()),
    ];
    langsys_fields.extend(u16_fields(&feature_indices));
    let script = table(vec![Field::Offset16(table(langsys_fields)), Field::U16(0)]);
    let script_list = table(vec![
        Field::U16(1),
        Field::U32(script_tag),
        Field::Offset16(script),
    ]);

    let mut feature_list_fields = vec![count(features.len())];
    for &(feature_tag, lookup_indices) in features {
        let mut feature_fields = vec![Field::Null16, count(lookup_indices.len())];
        feature_fields.extend(u16_fields(lookup_indices));
        feature_list_fields.push(Field::U32(feature_tag));
        feature_list_fields.push(Field::Offset16(table(feature_fields)));
    }

    table(vec![
        Field::U16(1),
        Field::U16(0),
        Field::Offset16(script_list),
        Field::Offset16(table(feature_list_fields)),
        Field::Offset16(lookup_list(lookups)),
    ])
}

/// `GDEF` table with glyph classes, mark attachment classes and, when any are given, mark glyph
/// sets. Glyphs must be sorted.
pub fn gdef(
    glyph_classes: &[(u16, u16)],
    mark_attach_classes: &[(u16, u16)],
    mark_glyph_sets: &[&[u16]],
) -> Vec<u8> {
    let mut fields = vec![
        Field::U16(1),
        Field::U16(if mark_glyph_sets.is_empty() { 0 } else { 2 }),
        Field::Offset16(classdef(glyph_classes)),
        Field::Null16,
        Field::Null16,
        Field::Offset16(classdef(mark_attach_classes)),
    ];
    if !mark_glyph_sets.is_empty() {
        let mut set_fields = vec![Field::U16(1), count(mark_glyph_sets.len())];
        set_fields.extend(
            mark_glyph_sets
                .iter()
                .map(|glyphs| Field::Offset32(coverage(glyphs))),
        );
        fields.push(Field::Offset16(table(set_fields)));
    }
    table(fields)
}
