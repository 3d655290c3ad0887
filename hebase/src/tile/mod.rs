mod ciphertext;
mod plaintext;

pub use ciphertext::*;
pub use plaintext::*;

#[derive(Debug, Clone, Copy, PartialEq)]
/// A value broadcast to every slot by [`CTile::add_scalar`] and [`CTile::multiply_scalar`].
pub enum Scalar {
    /// An integer. Exact on modular schemes.
    Int(i64),

    /// A real number.
    Real(f64),
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}
