#[derive(Debug, thiserror::Error)]
/// Errors produced by contexts, tiles, encoders and evaluators.
pub enum Error {
    #[error("{0} is not implemented for this scheme")]
    /// The backend does not provide the requested operation.
    NotImplemented(&'static str),

    #[error("{0} is not supported by this scheme")]
    /// The operation exists but the scheme's capabilities rule it out.
    NotSupported(&'static str),

    #[error("This context does not have a secret key")]
    /// Decryption or secret key export attempted on a public-only context.
    NoSecretKey,

    #[error("This context already has a secret key")]
    /// A secret key was loaded into a context that already holds one.
    SecretKeyAlreadyLoaded,

    #[error("The secret key does not match this context's public key")]
    /// The key material does not belong to this context.
    KeyMismatch,

    #[error("Chain index mismatch: {left} vs {right}")]
    /// Operands of a raw binary operation sit at different chain indices.
    ChainIndexMismatch {
        /// The receiver's chain index.
        left: u32,
        /// The other operand's chain index.
        right: u32,
    },

    #[error("Scale mismatch: {left} vs {right}")]
    /// Operands of an additive operation carry different scales.
    ScaleMismatch {
        /// The receiver's scale.
        left: f64,
        /// The other operand's scale.
        right: f64,
    },

    #[error("Chain index is already at its lowest value")]
    /// The multiplicative depth budget is used up.
    ChainIndexExhausted,

    #[error("Chain index {requested} is out of range (maximum {max})")]
    /// A chain index above the allowed maximum was requested.
    InvalidChainIndex {
        /// The requested chain index.
        requested: u32,
        /// The highest chain index allowed here.
        max: u32,
    },

    #[error("Cannot encode {len} values into {slots} slots")]
    /// The input vector is longer than the slot count.
    TooManyValues {
        /// The length of the input.
        len: usize,
        /// The slot count of the context.
        slots: usize,
    },

    #[error("This scheme does not support complex values")]
    /// Complex input was given to a scheme over integers.
    ComplexNotSupported,

    #[error("Tile was created by a different scheme")]
    /// A tile was passed to an object of another backend.
    SchemeMismatch,

    #[error("Tiles belong to different contexts")]
    /// Tiles created under different contexts were combined.
    ContextMismatch,

    #[error("Tile is empty")]
    /// The tile holds no value yet.
    EmptyTile,

    #[error("Unrecognized context {0}")]
    /// No backend is registered for a saved context's header.
    UnknownContext(String),

    #[error("Context for {expected} trying to read a context for {found}")]
    /// A saved context belongs to another backend.
    ContextHeaderMismatch {
        /// The header of the reading backend.
        expected: String,
        /// The header found in the stream.
        found: String,
    },

    #[error(
        "Assert equals failed: {title}, at slot {slot}, expected value: {expected}, actual value: {actual}, diff: {diff}, relative-diff: {relative_diff}, epsilon: {eps}"
    )]
    /// Decrypted values differ from the expected values beyond tolerance.
    AssertEqualsFailed {
        /// The caller-supplied title.
        title: String,
        /// The first offending slot.
        slot: usize,
        /// The expected value at `slot`.
        expected: num::Complex<f64>,
        /// The decrypted value at `slot`.
        actual: num::Complex<f64>,
        /// The absolute difference.
        diff: f64,
        /// The relative difference.
        relative_diff: f64,
        /// The tolerance.
        eps: f64,
    },

    #[error("Invalid argument: {0}")]
    /// An argument is outside its domain.
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    /// The configuration cannot produce a working context.
    InvalidConfig(String),

    #[error("Malformed data: {0}")]
    /// Deserialized data is inconsistent with the context.
    MalformedData(String),

    #[error("{0}")]
    /// Reading or writing a stream failed.
    Io(#[from] std::io::Error),

    #[error("{0}")]
    /// Binary (de)serialization failed.
    Bincode(#[from] bincode::Error),

    #[error("{0}")]
    /// JSON (de)serialization failed.
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
