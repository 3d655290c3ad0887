use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// A set of flags characterizing the underlying HE scheme.
///
/// # Remarks
/// Query these to keep application code scheme-oblivious, e.g. only call
/// [`crate::CTile::rescale`] explicitly when `supports_explicit_rescale` is set and
/// `automatically_manages_rescale` is not.
pub struct HeTraits {
    /// Ciphertexts can be bootstrapped to refresh their chain index.
    pub supports_bootstrapping: bool,

    /// The scheme exposes a rescale operation.
    pub supports_explicit_rescale: bool,

    /// Binary operations align the chain indices of their operands on their own, including
    /// the raw variants.
    pub automatically_manages_chain_indices: bool,

    /// Multiplications rescale on their own, including the raw variants.
    pub automatically_manages_rescale: bool,

    /// Chain indices can be queried and lowered explicitly.
    pub supports_explicit_chain_indices: bool,

    /// Slots hold complex numbers.
    pub supports_complex_numbers: bool,

    /// A bitwise evaluator is available.
    pub supports_bitwise_operations: bool,

    /// Slot arithmetic is performed modulo [`HeTraits::arithmetic_modulus`].
    pub is_modular_arithmetic: bool,

    /// Plaintexts carry a scale factor.
    pub supports_scaled_encoding: bool,

    /// The modulus `p^r` of slot arithmetic when `is_modular_arithmetic` is set, otherwise 0.
    pub arithmetic_modulus: u64,

    /// Tiles carry no data at all. Used for dry runs.
    pub is_debug_empty: bool,

    /// The decoder can add calibrated noise to decrypted values.
    pub supports_decrypt_added_noise: bool,
}

impl HeTraits {
    /// Keeps only the capabilities shared with `other`.
    ///
    /// # Remarks
    /// The arithmetic modulus survives only if both sides agree on it.
    pub fn intersect(&mut self, other: &HeTraits) {
        self.supports_bootstrapping &= other.supports_bootstrapping;
        self.supports_explicit_rescale &= other.supports_explicit_rescale;
        self.automatically_manages_chain_indices &= other.automatically_manages_chain_indices;
        self.automatically_manages_rescale &= other.automatically_manages_rescale;
        self.supports_explicit_chain_indices &= other.supports_explicit_chain_indices;
        self.supports_complex_numbers &= other.supports_complex_numbers;
        self.supports_bitwise_operations &= other.supports_bitwise_operations;
        self.is_modular_arithmetic &= other.is_modular_arithmetic;
        self.supports_scaled_encoding &= other.supports_scaled_encoding;
        self.is_debug_empty &= other.is_debug_empty;
        self.supports_decrypt_added_noise &= other.supports_decrypt_added_noise;

        if self.arithmetic_modulus != other.arithmetic_modulus || !self.is_modular_arithmetic {
            self.arithmetic_modulus = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_intersect_traits() {
        let mut ckks = HeTraits {
            supports_explicit_rescale: true,
            supports_explicit_chain_indices: true,
            supports_complex_numbers: true,
            supports_scaled_encoding: true,
            ..Default::default()
        };

        let bgv = HeTraits {
            supports_explicit_chain_indices: true,
            automatically_manages_chain_indices: true,
            is_modular_arithmetic: true,
            arithmetic_modulus: 131,
            ..Default::default()
        };

        ckks.intersect(&bgv);

        assert_eq!(
            ckks,
            HeTraits {
                supports_explicit_chain_indices: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn intersect_keeps_shared_modulus() {
        let bgv = HeTraits {
            is_modular_arithmetic: true,
            arithmetic_modulus: 131,
            ..Default::default()
        };

        let mut other = bgv;
        other.intersect(&bgv);
        assert_eq!(other.arithmetic_modulus, 131);

        let mut other = HeTraits {
            is_modular_arithmetic: true,
            arithmetic_modulus: 257,
            ..Default::default()
        };
        other.intersect(&bgv);
        assert!(other.is_modular_arithmetic);
        assert_eq!(other.arithmetic_modulus, 0);
    }
}
