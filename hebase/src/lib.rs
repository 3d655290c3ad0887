#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! This crate provides a scheme-oblivious API for homomorphic encryption.
//!
//! An [`HeContext`] holds a scheme's parameters and keys. [`CTile`]s (ciphertexts) and
//! [`PTile`]s (plaintexts) created over it each pack a vector of values into slots, and all
//! arithmetic on them works slot-wise. An [`Encoder`] moves native values in and out of
//! tiles, and a [`NativeFunctionEvaluator`] exposes the functions a scheme computes
//! natively. Query [`HeContext::traits`] to write code that runs unchanged on any scheme.
//!
//! The [`mockup`] module provides a CKKS-like and a BGV-like backend. They implement the
//! whole contract (chain indices, scales, key separation, persistence) but do not encrypt.
//!
//! # Example
//!
//! ```rust
//! use hebase::{BGV_NOT_SECURE_48, CTile, Encoder, HeContext, MockupBgvContext,
//!     NativeFunctionEvaluator};
//!
//! let he = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();
//! let enc = Encoder::new(&he);
//! let eval = NativeFunctionEvaluator::new(&he);
//!
//! // Compare two encrypted strings slot by slot.
//! let mut a = CTile::new(&he);
//! let mut b = CTile::new(&he);
//! enc.encode_encrypt(&mut a, &[1i64, 2, 3], None).unwrap();
//! enc.encode_encrypt(&mut b, &[1i64, 5, 3], None).unwrap();
//!
//! // Fermat's little theorem: x^(p-1) is 1 for nonzero x and 0 otherwise.
//! a.sub(&b).unwrap();
//! eval.power_in_place(&mut a, BGV_NOT_SECURE_48.p as u32 - 1).unwrap();
//!
//! assert_eq!(&enc.decrypt_decode_i64(&a).unwrap()[..3], &[0, 1, 0]);
//! assert!(a.chain_index() < he.top_chain_index());
//! ```
mod config;
mod context;
mod encoder;
mod error;
mod function_evaluator;
mod tile;
mod traits;

pub mod mockup;

/// A safe wrapper around [`bincode`] deserialization to limit input sizes and prevent malicious or
/// improperly serialized data from causing panics.
pub mod safe_bincode;

#[doc(hidden)]
pub mod test_utils;

pub use config::*;
pub use context::*;
pub use encoder::*;
pub use error::*;
pub use function_evaluator::{AbstractFunctionEvaluator, NativeFunctionEvaluator};
pub use mockup::{MockupBgvContext, MockupCkksContext};
pub use tile::*;
pub use traits::*;
