//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes on the wire were wrong: the
//! connection is fine, the room is fine, the client just sent something we
//! cannot decode.

/// Errors that can occur while decoding or encoding brand frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A JSON body could not be (de)serialized.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// A protobuf envelope could not be decoded.
    #[error("protobuf decode failed: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// Input ended before a complete value was read.
    #[error("truncated frame: needed {needed} more bytes")]
    Truncated { needed: usize },

    /// An SFS type tag we do not understand.
    #[error("unsupported sfs type tag {0}")]
    UnsupportedType(u8),

    /// The frame is well-formed but violates the brand's rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Unknown brand name.
    #[error("unknown game brand {0:?}")]
    UnknownBrand(String),
}
