//! Scheme backends that honor the full [`crate::HeContext`] contract while keeping slot
//! values unencrypted.
//!
//! # Security
//! Mockup ciphertexts hold their values in the clear. They exist so scheme-oblivious code can
//! be developed and tested against the capabilities of a CKKS-like and a BGV-like scheme.
//! Never use them to protect data.
//!
//! # Remarks
//! Both backends are instances of [`MockupContext`], parameterized by a [`MockupScheme`]
//! describing the slot arithmetic and capabilities. Chain indices, scales, keys and
//! persistence behave as in a real scheme: operands must be aligned, multiplications consume
//! depth, decryption needs the secret key matching the public key a ciphertext was encrypted
//! under.
use std::fmt::Debug;

use num::Complex;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    AbstractFunctionEvaluator, Error, HeConfigRequirement, HeTraits, Result,
    function_evaluator::UnsupportedFunctionEvaluator,
};

mod bgv;
mod ciphertext;
mod ckks;
mod context;
mod encoder;
mod keys;
mod plaintext;

pub use bgv::*;
pub use ciphertext::*;
pub use ckks::*;
pub use context::*;
pub use encoder::*;
pub use keys::*;
pub use plaintext::*;

/// The library name of every mockup backend.
pub const LIBRARY_NAME: &str = "Mockup";

/// The slot arithmetic and capabilities of a mockup backend.
pub trait MockupScheme: Debug + Send + Sync + Sized + 'static {
    /// The parameters a context is initialized from.
    type Config: Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    /// The value held in one slot. [`Default`] is zero.
    type Slot: Debug + Copy + Default + PartialEq + Send + Sync + Serialize + DeserializeOwned;

    /// The scheme name reported by [`crate::HeContext::scheme_name`].
    const SCHEME_NAME: &'static str;

    /// `<library>_<scheme>`, written in the header of saved contexts.
    const HEADER_CODE: &'static str;

    /// Validates `config` and builds the scheme.
    fn new(config: &Self::Config) -> Result<Self>;

    /// The parameters this scheme was built from.
    fn config(&self) -> &Self::Config;

    /// The capabilities of this scheme.
    fn traits(&self) -> HeTraits;

    /// The number of slots per tile.
    fn slot_count(&self) -> usize;

    /// The chain index of fresh encodings.
    fn top_chain_index(&self) -> u32;

    /// The factor a rescale divides the scale by. Also the initial default scale.
    fn rescale_factor(&self) -> f64;

    /// The nominal security level in bits.
    fn security_level(&self) -> u32;

    /// The size of the context's thread pool.
    fn num_threads(&self) -> usize;

    /// A one-line description of the parameters.
    fn describe(&self) -> String;

    /// See [`crate::HeContext::modulus_chain`].
    fn modulus_chain(&self) -> Result<Vec<u64>> {
        Err(Error::NotImplemented("modulus_chain"))
    }

    /// See [`crate::HeContext::is_config_requirement_feasible`].
    fn is_config_requirement_feasible(&self, _req: &HeConfigRequirement) -> Result<bool> {
        Err(Error::NotImplemented("is_config_requirement_feasible"))
    }

    /// The evaluator of the functions this scheme computes natively, bound to `he`.
    fn function_evaluator(_he: &MockupContext<Self>) -> Box<dyn AbstractFunctionEvaluator> {
        Box::new(UnsupportedFunctionEvaluator)
    }

    /// `a + b`
    fn add(&self, a: Self::Slot, b: Self::Slot) -> Self::Slot;

    /// `a - b`
    fn sub(&self, a: Self::Slot, b: Self::Slot) -> Self::Slot;

    /// `a * b`
    fn mul(&self, a: Self::Slot, b: Self::Slot) -> Self::Slot;

    /// `-a`
    fn neg(&self, a: Self::Slot) -> Self::Slot;

    /// The complex conjugate of `a`.
    fn conj(&self, a: Self::Slot) -> Self::Slot;

    /// `a * factor`, used when a ciphertext's scale is reinterpreted.
    fn scale_value(&self, a: Self::Slot, _factor: f64) -> Self::Slot {
        a
    }

    /// `a` perturbed by decryption noise.
    fn perturb(&self, a: Self::Slot, _noise: Complex<f64>) -> Self::Slot {
        a
    }

    /// Encodes a real number.
    fn from_f64(&self, v: f64) -> Result<Self::Slot>;

    /// Encodes an integer.
    fn from_i64(&self, v: i64) -> Self::Slot;

    /// Encodes a complex number.
    fn from_complex(&self, v: Complex<f64>) -> Result<Self::Slot>;

    /// Decodes a slot as a real number.
    fn to_f64(&self, a: Self::Slot) -> f64;

    /// Decodes a slot as an integer.
    fn to_i64(&self, a: Self::Slot) -> i64;

    /// Decodes a slot as a complex number.
    fn to_complex(&self, a: Self::Slot) -> Complex<f64>;

    /// Whether a deserialized slot value is admissible.
    fn is_valid(&self, a: &Self::Slot) -> bool;
}

pub(crate) fn check_scale(scale: f64) -> Result<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::InvalidArgument(format!("invalid scale {scale}")));
    }

    Ok(())
}

pub(crate) fn check_finite(v: Complex<f64>) -> Result<()> {
    if !v.re.is_finite() || !v.im.is_finite() {
        return Err(Error::InvalidArgument(format!("cannot encode {v}")));
    }

    Ok(())
}
