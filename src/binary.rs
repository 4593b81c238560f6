/// Read binary data
pub mod read;

// Marker types naming the big-endian encodings found in OpenType layout tables. They are never
// instantiated; `ReadFixed` maps each to the host type it decodes to.

#[derive(Copy, Clone)]
pub enum U16Be {}

#[derive(Copy, Clone)]
pub enum I16Be {}

#[derive(Copy, Clone)]
pub enum U32Be {}
