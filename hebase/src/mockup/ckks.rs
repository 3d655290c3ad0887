use num::Complex;

use crate::{HeConfigRequirement, HeTraits, Result};

use super::{MockupContext, MockupScheme, check_finite};

#[derive(Debug, Clone)]
/// CKKS-like slot arithmetic over complex numbers with explicit rescaling.
///
/// # Remarks
/// Chain indices and scales must be managed by the caller for raw operations. Non-raw
/// multiplications rescale on their own and consume one level.
pub struct Ckks {
    config: HeConfigRequirement,
}

/// A CKKS-like mockup context.
pub type MockupCkksContext = MockupContext<Ckks>;

impl MockupScheme for Ckks {
    type Config = HeConfigRequirement;
    type Slot = Complex<f64>;

    const SCHEME_NAME: &'static str = "CKKS";
    const HEADER_CODE: &'static str = "Mockup_CKKS";

    fn new(config: &HeConfigRequirement) -> Result<Self> {
        config.validate()?;

        Ok(Self { config: *config })
    }

    fn config(&self) -> &HeConfigRequirement {
        &self.config
    }

    fn traits(&self) -> HeTraits {
        HeTraits {
            supports_explicit_rescale: true,
            supports_explicit_chain_indices: true,
            supports_complex_numbers: true,
            supports_scaled_encoding: true,
            supports_decrypt_added_noise: true,
            ..Default::default()
        }
    }

    fn slot_count(&self) -> usize {
        self.config.num_slots
    }

    fn top_chain_index(&self) -> u32 {
        self.config.multiplication_depth
    }

    fn rescale_factor(&self) -> f64 {
        f64::from(self.config.fractional_part_precision).exp2()
    }

    fn security_level(&self) -> u32 {
        self.config.security_level
    }

    fn num_threads(&self) -> usize {
        self.config.num_threads
    }

    fn describe(&self) -> String {
        format!(
            "slots={} depth={} precision={}.{}",
            self.config.num_slots,
            self.config.multiplication_depth,
            self.config.integer_part_precision,
            self.config.fractional_part_precision
        )
    }

    fn modulus_chain(&self) -> Result<Vec<u64>> {
        let first = u64::from(
            self.config.integer_part_precision + self.config.fractional_part_precision,
        );
        let rest = u64::from(self.config.fractional_part_precision);

        Ok(std::iter::once(first)
            .chain(std::iter::repeat_n(
                rest,
                self.config.multiplication_depth as usize,
            ))
            .collect())
    }

    fn is_config_requirement_feasible(&self, req: &HeConfigRequirement) -> Result<bool> {
        Ok(req.validate().is_ok())
    }

    fn add(&self, a: Complex<f64>, b: Complex<f64>) -> Complex<f64> {
        a + b
    }

    fn sub(&self, a: Complex<f64>, b: Complex<f64>) -> Complex<f64> {
        a - b
    }

    fn mul(&self, a: Complex<f64>, b: Complex<f64>) -> Complex<f64> {
        a * b
    }

    fn neg(&self, a: Complex<f64>) -> Complex<f64> {
        -a
    }

    fn conj(&self, a: Complex<f64>) -> Complex<f64> {
        a.conj()
    }

    fn scale_value(&self, a: Complex<f64>, factor: f64) -> Complex<f64> {
        a * factor
    }

    fn perturb(&self, a: Complex<f64>, noise: Complex<f64>) -> Complex<f64> {
        a + noise
    }

    fn from_f64(&self, v: f64) -> Result<Complex<f64>> {
        let v = Complex::new(v, 0.0);
        check_finite(v)?;

        Ok(v)
    }

    fn from_i64(&self, v: i64) -> Complex<f64> {
        Complex::new(v as f64, 0.0)
    }

    fn from_complex(&self, v: Complex<f64>) -> Result<Complex<f64>> {
        check_finite(v)?;

        Ok(v)
    }

    fn to_f64(&self, a: Complex<f64>) -> f64 {
        a.re
    }

    fn to_i64(&self, a: Complex<f64>) -> i64 {
        a.re.round() as i64
    }

    fn to_complex(&self, a: Complex<f64>) -> Complex<f64> {
        a
    }

    fn is_valid(&self, a: &Complex<f64>) -> bool {
        a.re.is_finite() && a.im.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        CKKS_NOT_SECURE_512_FAST, CTile, Encoder, Error, HeContext, test_utils::get_ckks_context,
    };

    use super::*;

    #[test]
    fn can_conjugate() {
        let he = get_ckks_context();
        let mut enc = Encoder::new(&he);
        enc.set_decrypt_added_noise_enabled(false).unwrap();

        let mut c = CTile::new(&he);
        enc.encode_encrypt(&mut c, &[Complex::new(1.0, 2.0)], None)
            .unwrap();
        c.conjugate().unwrap();

        assert_eq!(
            enc.decrypt_decode_complex(&c).unwrap()[0],
            Complex::new(1.0, -2.0)
        );
    }

    #[test]
    fn rejects_non_finite_values() {
        let he = get_ckks_context();
        let enc = Encoder::new(&he);

        let mut c = CTile::new(&he);

        assert!(matches!(
            enc.encode_encrypt(&mut c, &[f64::NAN], None),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn reports_capabilities() {
        let he = get_ckks_context();
        let traits = he.traits();

        assert!(traits.supports_explicit_rescale);
        assert!(!traits.automatically_manages_rescale);
        assert!(!traits.is_modular_arithmetic);
        assert_eq!(he.scheme_name(), "CKKS");
        assert_eq!(he.header_code(), Ckks::HEADER_CODE);
        assert_eq!(he.default_scale(), 2f64.powi(40));
        assert!(
            he.is_config_requirement_feasible(&CKKS_NOT_SECURE_512_FAST)
                .unwrap()
        );
    }

    #[test]
    fn rejects_invalid_requirements() {
        let req = HeConfigRequirement {
            num_slots: 100,
            ..CKKS_NOT_SECURE_512_FAST
        };

        assert!(matches!(
            MockupCkksContext::init(&req),
            Err(Error::InvalidConfig(_))
        ));
    }
}
