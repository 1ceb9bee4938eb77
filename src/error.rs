//! Error types shared by cells, dictionaries and parsers.

/// Failure of a cell level operation.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// Read past the end of a slice (bits or references).
    #[error("cell underflow")]
    CellUnderflow,
    /// Builder capacity of 1023 bits or 4 references exceeded.
    #[error("cell overflow")]
    CellOverflow,
    /// Data of a pruned branch is not available.
    #[error("pruned branch access")]
    PrunedBranchAccess,
    /// An exotic cell was found where an ordinary one is required.
    #[error("unexpected exotic cell")]
    UnexpectedExoticCell,
    /// Malformed descriptor, exotic payload or hashes.
    #[error("invalid cell")]
    InvalidCell,
    /// Structurally valid cells with contents that violate a layout.
    #[error("invalid data")]
    InvalidData,
    /// Constructor tag does not match any known variant.
    #[error("invalid tag")]
    InvalidTag,
    /// Proof was requested for a key set that is empty or missing.
    #[error("empty proof")]
    EmptyProof,
    /// Depth of a cell tree exceeds the allowed maximum.
    #[error("cell depth overflow")]
    DepthOverflow,
    /// Integer does not fit into the requested width.
    #[error("integer overflow")]
    IntOverflow,
}

/// Failure while parsing a bounded integer from a string or primitive.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseIntError {
    #[error("invalid integer string")]
    InvalidString(#[source] std::num::ParseIntError),
    #[error("integer is out of range")]
    Overflow,
}

/// Failure while parsing a [`HashBytes`] from a string.
///
/// [`HashBytes`]: crate::cell::HashBytes
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseHashBytesError {
    #[cfg(feature = "base64")]
    #[error("invalid base64 hash")]
    InvalidBase64(#[from] base64::DecodeSliceError),
    #[error("invalid hex hash")]
    InvalidHex(#[from] hex::FromHexError),
    /// Neither 64 hex chars nor 44 base64 chars.
    #[error("unexpected hash string length")]
    UnexpectedStringLength,
}

/// Failure while parsing a `workchain:hex` address.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseAddrError {
    #[error("empty address string")]
    Empty,
    #[error("invalid workchain")]
    InvalidWorkchain,
    #[error("invalid account id")]
    InvalidAccountId,
    #[error("too many address parts")]
    UnexpectedPart,
}
