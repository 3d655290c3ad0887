use crate::{AbstractCiphertext, CTile, Error, HeContext, Result};

/// The scheme-specific half of a [`NativeFunctionEvaluator`].
///
/// # Remarks
/// Every method defaults to [`Error::NotImplemented`]. Backends override the functions
/// their scheme computes natively.
pub trait AbstractFunctionEvaluator: Send + Sync {
    /// Raises every slot of `c` to the power `exponent`.
    fn power_in_place(&self, _c: &mut dyn AbstractCiphertext, _exponent: u32) -> Result<()> {
        Err(Error::NotImplemented("power_in_place"))
    }

    /// Returns the slot-wise product of all `multiplicands`.
    fn total_product(
        &self,
        _multiplicands: &[&dyn AbstractCiphertext],
    ) -> Result<Box<dyn AbstractCiphertext>> {
        Err(Error::NotImplemented("total_product"))
    }
}

/// The evaluator of schemes without native functions.
pub(crate) struct UnsupportedFunctionEvaluator;

impl AbstractFunctionEvaluator for UnsupportedFunctionEvaluator {}

/// Evaluates functions through the scheme's native implementation.
pub struct NativeFunctionEvaluator {
    inner: Box<dyn AbstractFunctionEvaluator>,
}

impl NativeFunctionEvaluator {
    /// Creates an evaluator for the given context.
    pub fn new(he: &dyn HeContext) -> Self {
        Self {
            inner: he.function_evaluator(),
        }
    }

    /// Raises every slot of `c` to the power `exponent`.
    ///
    /// # Errors
    /// [`Error::NotImplemented`] on schemes without a native power function.
    pub fn power_in_place(&self, c: &mut CTile, exponent: u32) -> Result<()> {
        self.inner.power_in_place(c.as_abstract_mut(), exponent)
    }

    /// Stores the slot-wise product of all `multiplicands` in `result`.
    ///
    /// # Errors
    /// [`Error::NotImplemented`] on schemes without a native total product and
    /// [`Error::InvalidArgument`] if `multiplicands` is empty.
    pub fn total_product(&self, result: &mut CTile, multiplicands: &[CTile]) -> Result<()> {
        let multiplicands = multiplicands
            .iter()
            .map(|c| c.as_abstract())
            .collect::<Vec<_>>();

        *result = self.inner.total_product(&multiplicands)?.into();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Encoder,
        test_utils::{get_bgv_context, get_ckks_context},
    };

    use super::*;

    #[test]
    fn ckks_has_no_native_functions() {
        let he = get_ckks_context();
        let enc = Encoder::new(&he);
        let eval = NativeFunctionEvaluator::new(&he);

        let mut c = CTile::new(&he);
        enc.encode_encrypt(&mut c, &[2.0], None).unwrap();

        assert!(matches!(
            eval.power_in_place(&mut c, 2),
            Err(Error::NotImplemented(_))
        ));

        let mut res = CTile::new(&he);
        assert!(matches!(
            eval.total_product(&mut res, &[c]),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn can_raise_to_power() {
        let he = get_bgv_context();
        let enc = Encoder::new(&he);
        let eval = NativeFunctionEvaluator::new(&he);
        let p = he.traits().arithmetic_modulus;

        let vals = (0..he.slot_count() as i64).collect::<Vec<_>>();
        let mut c = CTile::new(&he);
        enc.encode_encrypt(&mut c, &vals, None).unwrap();

        let mut cubes = c.clone();
        eval.power_in_place(&mut cubes, 3).unwrap();

        let expected = vals
            .iter()
            .map(|v| v.pow(3) % p as i64)
            .collect::<Vec<_>>();
        assert_eq!(enc.decrypt_decode_i64(&cubes).unwrap(), expected);

        eval.power_in_place(&mut c, p as u32 - 1).unwrap();

        let res = enc.decrypt_decode_i64(&c).unwrap();
        assert_eq!(res[0], 0);
        assert!(res[1..].iter().all(|v| *v == 1));
    }

    #[test]
    fn can_compute_total_product() {
        let he = get_bgv_context();
        let enc = Encoder::new(&he);
        let eval = NativeFunctionEvaluator::new(&he);

        let tiles = [2i64, 3, 5, 7, 11]
            .iter()
            .map(|v| {
                let mut c = CTile::new(&he);
                enc.encode_encrypt(&mut c, &[*v], None).unwrap();
                c
            })
            .collect::<Vec<_>>();

        let mut res = CTile::new(&he);
        eval.total_product(&mut res, &tiles).unwrap();

        assert_eq!(enc.decrypt_decode_i64(&res).unwrap()[0], 2310 % 131);

        // ceil(log2(5)) levels
        assert_eq!(
            res.chain_index(),
            he.top_chain_index().map(|top| top - 3)
        );

        assert!(matches!(
            eval.total_product(&mut res, &[]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
