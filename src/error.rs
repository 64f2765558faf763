use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while parsing a SOR file.
///
/// Only [`SorError::FileIo`] and [`SorError::MalformedMap`] abort a parse.
/// The other kinds describe failures inside a single block; the orchestrator
/// catches those, stores their message in the record under the offending
/// block's key, and keeps decoding the remaining blocks.
#[derive(Debug, Error)]
pub enum SorError {
    /// The input file could not be read at all.
    #[error("failed to read {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The leading map block is unusable, so no block offsets can be derived.
    #[error("malformed map block: {0}")]
    MalformedMap(String),
    /// A fixed-width read would run past the end of the data it may see.
    #[error("{block} is truncated: {detail}")]
    Truncated { block: String, detail: String },
    /// A block decoder failed for a reason other than running out of bytes.
    #[error("{block} failed to decode: {detail}")]
    BlockDecode { block: String, detail: String },
}
