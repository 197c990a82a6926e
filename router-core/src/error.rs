/// Errors from decoding a fixed-layout header out of a byte slice.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum CodecError {
    #[error("buffer too short: need at least {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("unsupported value {value:#x} for field {field}")]
    Unsupported { field: &'static str, value: u32 },
}
