use std::io;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every way an extraction can fail.
///
/// The first two variants are fatal to the whole run: without a valid
/// container and manifest there is nothing to plan. Everything else is scoped
/// to the partition whose operation raised it and is reported through that
/// partition's [`crate::extract::PartitionReport`] without affecting siblings.
/// No failure here is retried; all causes are deterministic for a given input.
#[derive(Debug, Error)]
pub enum Error {
    /// The payload's fixed header is broken: wrong magic, unsupported
    /// version, or declared lengths past the end of the stream.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// The manifest blob violates its schema.
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// A block extent that cannot be resolved to a byte range.
    #[error("invalid extent: {0}")]
    InvalidExtent(String),

    /// An operation's output does not fill its destination extents.
    #[error("destination extents hold {expected} bytes but operation produced {actual}")]
    ExtentLengthMismatch { expected: u64, actual: u64 },

    /// The fetched data blob does not match its declared SHA-256.
    #[error("operation data hash mismatch: expected {expected}, got {actual}")]
    DataIntegrityError { expected: String, actual: String },

    /// A compressed data blob could not be decoded.
    #[error("{codec} decode failed: {source}")]
    CodecError {
        codec: &'static str,
        #[source]
        source: io::Error,
    },

    /// A bsdiff or puffdiff patch could not be applied.
    #[error("patch apply failed: {0}")]
    PatchApplyError(String),

    /// A source-reading operation has no old image to read from.
    #[error("missing source data: {0}")]
    MissingSourceData(String),

    /// The old image does not match the hash the manifest expects of it.
    #[error("old image hash mismatch: expected {expected}, got {actual}")]
    SourceVerificationFailed { expected: String, actual: String },

    /// The finished image does not match the hash the manifest declares.
    #[error("partition verification failed: expected {expected}, got {actual}")]
    PartitionVerificationFailed { expected: String, actual: String },

    /// A requested partition name is not in the manifest.
    #[error("partition {0:?} not found in manifest")]
    UnknownPartition(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
