use num::Complex;

use crate::{AbstractCiphertext, AbstractFunctionEvaluator, BgvConfig, Error, HeTraits, Result};

use super::{MockupCiphertext, MockupContext, MockupScheme, check_finite};

#[derive(Debug, Clone)]
/// BGV-like slot arithmetic over integers modulo `p^r`.
///
/// # Remarks
/// Chain indices and rescaling are managed automatically, including by the raw
/// operations. Every ciphertext multiplication consumes one level. Slots decode to the
/// canonical residue in `[0, p^r)`.
pub struct Bgv {
    config: BgvConfig,
    modulus: u64,
}

/// A BGV-like mockup context.
pub type MockupBgvContext = MockupContext<Bgv>;

impl MockupScheme for Bgv {
    type Config = BgvConfig;
    type Slot = u64;

    const SCHEME_NAME: &'static str = "BGV";
    const HEADER_CODE: &'static str = "Mockup_BGV";

    fn new(config: &BgvConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config: *config,
            modulus: config.modulus()?,
        })
    }

    fn config(&self) -> &BgvConfig {
        &self.config
    }

    fn traits(&self) -> HeTraits {
        HeTraits {
            automatically_manages_chain_indices: true,
            automatically_manages_rescale: true,
            supports_explicit_chain_indices: true,
            is_modular_arithmetic: true,
            arithmetic_modulus: self.modulus,
            ..Default::default()
        }
    }

    fn slot_count(&self) -> usize {
        self.config.num_slots
    }

    fn top_chain_index(&self) -> u32 {
        self.config.depth
    }

    fn rescale_factor(&self) -> f64 {
        1.0
    }

    fn security_level(&self) -> u32 {
        self.config.security_level
    }

    fn num_threads(&self) -> usize {
        self.config.num_threads
    }

    fn describe(&self) -> String {
        format!(
            "p={} r={} slots={} depth={}",
            self.config.p, self.config.r, self.config.num_slots, self.config.depth
        )
    }

    fn function_evaluator(he: &MockupBgvContext) -> Box<dyn AbstractFunctionEvaluator> {
        Box::new(BgvFunctionEvaluator::new(he))
    }

    fn add(&self, a: u64, b: u64) -> u64 {
        (a + b) % self.modulus
    }

    fn sub(&self, a: u64, b: u64) -> u64 {
        (a + self.modulus - b) % self.modulus
    }

    fn mul(&self, a: u64, b: u64) -> u64 {
        // Both operands are below 2^32.
        a * b % self.modulus
    }

    fn neg(&self, a: u64) -> u64 {
        (self.modulus - a) % self.modulus
    }

    fn conj(&self, a: u64) -> u64 {
        a
    }

    fn from_f64(&self, v: f64) -> Result<u64> {
        check_finite(Complex::new(v, 0.0))?;

        Ok(self.from_i64(v.round() as i64))
    }

    fn from_i64(&self, v: i64) -> u64 {
        i128::from(v).rem_euclid(i128::from(self.modulus)) as u64
    }

    fn from_complex(&self, _v: Complex<f64>) -> Result<u64> {
        Err(Error::ComplexNotSupported)
    }

    fn to_f64(&self, a: u64) -> f64 {
        a as f64
    }

    fn to_i64(&self, a: u64) -> i64 {
        a as i64
    }

    fn to_complex(&self, a: u64) -> Complex<f64> {
        Complex::new(a as f64, 0.0)
    }

    fn is_valid(&self, a: &u64) -> bool {
        *a < self.modulus
    }
}

/// Native functions of the BGV-like backend.
///
/// # Remarks
/// Powers use square-and-multiply, consuming `floor(log2(e)) + popcount(e) - 1` levels
/// for exponent `e`. Total products multiply pairwise in a balanced tree, consuming
/// `ceil(log2(n))` levels for `n` multiplicands.
///
/// Only tiles of the context this evaluator was created for are accepted. A failed
/// evaluation leaves its operands unchanged.
pub struct BgvFunctionEvaluator {
    he: MockupBgvContext,
}

impl BgvFunctionEvaluator {
    /// Creates an evaluator for tiles of `he`.
    pub fn new(he: &MockupBgvContext) -> Self {
        Self { he: he.clone() }
    }

    fn check_owned(&self, c: &MockupCiphertext<Bgv>) -> Result<()> {
        if !self.he.same_context(c.mockup_context()) {
            return Err(Error::ContextMismatch);
        }

        Ok(())
    }

    fn cipher<'a>(&self, c: &'a dyn AbstractCiphertext) -> Result<&'a MockupCiphertext<Bgv>> {
        let c = c
            .as_any()
            .downcast_ref::<MockupCiphertext<Bgv>>()
            .ok_or(Error::SchemeMismatch)?;
        self.check_owned(c)?;

        Ok(c)
    }
}

impl AbstractFunctionEvaluator for BgvFunctionEvaluator {
    fn power_in_place(&self, c: &mut dyn AbstractCiphertext, exponent: u32) -> Result<()> {
        let cipher = c
            .as_any_mut()
            .downcast_mut::<MockupCiphertext<Bgv>>()
            .ok_or(Error::SchemeMismatch)?;
        self.check_owned(cipher)?;

        if cipher.is_empty() {
            return Err(Error::EmptyTile);
        }

        if exponent == 0 {
            return Err(Error::InvalidArgument("exponent must be positive".to_owned()));
        }

        let base = cipher.clone();
        let mut acc = cipher.clone();
        let top_bit = u32::BITS - 1 - exponent.leading_zeros();

        for j in (0..top_bit).rev() {
            acc.square()?;

            if (exponent >> j) & 1 == 1 {
                acc.multiply(&base)?;
            }
        }

        *cipher = acc;

        Ok(())
    }

    fn total_product(
        &self,
        multiplicands: &[&dyn AbstractCiphertext],
    ) -> Result<Box<dyn AbstractCiphertext>> {
        let mut level = multiplicands
            .iter()
            .map(|c| Ok(self.cipher(*c)?.clone()))
            .collect::<Result<Vec<_>>>()?;

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut it = level.into_iter();

            while let Some(mut a) = it.next() {
                if let Some(b) = it.next() {
                    a.multiply(&b)?;
                }

                next.push(a);
            }

            level = next;
        }

        let product = level.pop().ok_or_else(|| {
            Error::InvalidArgument("total product of no multiplicands".to_owned())
        })?;

        Ok(Box::new(product))
    }
}
