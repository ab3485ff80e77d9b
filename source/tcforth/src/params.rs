use serde::Deserialize;

/// Sizes of the buffers owned by a [`Forth`](crate::Forth) VM.
///
/// All fields have defaults, so a partial config (e.g. a TOML file that only
/// sets `heap_bytes`) is fine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForthParams {
    pub data_stack_elems: usize,
    pub return_stack_elems: usize,
    pub heap_bytes: usize,
    pub input_buf_elems: usize,
    pub output_buf_elems: usize,
    /// Scratch space for `word`; also bounds the length of a name that can
    /// be given to `:` or `create`.
    pub word_buf_elems: usize,
}

impl Default for ForthParams {
    fn default() -> Self {
        Self {
            data_stack_elems: 1024,
            return_stack_elems: 64,
            heap_bytes: 32 * 1024,
            input_buf_elems: 1024,
            output_buf_elems: 4096,
            word_buf_elems: 64,
        }
    }
}
