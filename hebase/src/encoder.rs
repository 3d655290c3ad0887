use std::io::Write;

use log::error;
use num::Complex;

use crate::{AbstractCiphertext, AbstractPlaintext, CTile, Error, HeContext, PTile, Result};

/// The scheme-specific half of an [`Encoder`].
///
/// # Remarks
/// Input lengths and chain indices are validated by [`Encoder`] before reaching these
/// methods. A `chain_index` of `None` encodes at the top of the chain.
pub trait AbstractEncoder: Send + Sync {
    /// Encodes real values, zero padding up to the slot count.
    fn encode_f64(
        &self,
        res: &mut dyn AbstractPlaintext,
        vals: &[f64],
        chain_index: Option<u32>,
    ) -> Result<()>;

    /// Encodes complex values, zero padding up to the slot count.
    fn encode_complex(
        &self,
        res: &mut dyn AbstractPlaintext,
        vals: &[Complex<f64>],
        chain_index: Option<u32>,
    ) -> Result<()>;

    /// Encodes integers. By default they are cast to `f64`.
    fn encode_i64(
        &self,
        res: &mut dyn AbstractPlaintext,
        vals: &[i64],
        chain_index: Option<u32>,
    ) -> Result<()> {
        let vals = vals.iter().map(|v| *v as f64).collect::<Vec<_>>();

        self.encode_f64(res, &vals, chain_index)
    }

    /// Decodes every slot as a real number.
    fn decode_f64(&self, src: &dyn AbstractPlaintext) -> Result<Vec<f64>>;

    /// Decodes every slot as a complex number.
    fn decode_complex(&self, src: &dyn AbstractPlaintext) -> Result<Vec<Complex<f64>>>;

    /// Decodes every slot as an integer. By default real values are rounded to nearest.
    fn decode_i64(&self, src: &dyn AbstractPlaintext) -> Result<Vec<i64>> {
        Ok(self
            .decode_f64(src)?
            .into_iter()
            .map(|v| v.round() as i64)
            .collect())
    }

    /// Encrypts `src` under the context's public key.
    fn encrypt(&self, res: &mut dyn AbstractCiphertext, src: &dyn AbstractPlaintext)
    -> Result<()>;

    /// Decrypts `src` with the context's secret key.
    ///
    /// # Errors
    /// [`Error::NoSecretKey`] if the context has none.
    fn decrypt(&self, res: &mut dyn AbstractPlaintext, src: &dyn AbstractCiphertext)
    -> Result<()>;

    /// Sets the scale subsequent encodings use.
    fn set_default_scale(&mut self, _scale: f64) -> Result<()> {
        Err(Error::NotSupported("set_default_scale"))
    }

    /// The scale encodings use.
    fn default_scale(&self) -> Result<f64> {
        Err(Error::NotSupported("default_scale"))
    }

    /// Returns to the context's default scale.
    fn restore_default_scale(&mut self) -> Result<()> {
        Err(Error::NotSupported("restore_default_scale"))
    }

    /// Enables or disables noise added to decrypted values.
    fn set_decrypt_added_noise_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            return Err(Error::NotSupported("decrypt added noise"));
        }

        Ok(())
    }

    /// Whether noise is added to decrypted values.
    fn decrypt_added_noise_enabled(&self) -> bool {
        false
    }

    /// Sets the standard deviation of the added noise to `2^-bits`.
    fn set_decrypt_added_noise_precision(&mut self, _bits: u32) -> Result<()> {
        Err(Error::NotSupported("decrypt added noise precision"))
    }

    /// The added noise's standard deviation is `2^-bits` for the returned `bits`.
    fn decrypt_added_noise_precision(&self) -> Result<u32> {
        Err(Error::NotSupported("decrypt added noise precision"))
    }
}

/// Native values [`Encoder`] can encode into slots.
pub trait Encodable: Copy {
    /// Encodes `vals` with the matching [`AbstractEncoder`] method.
    fn encode_slice(
        encoder: &dyn AbstractEncoder,
        res: &mut dyn AbstractPlaintext,
        vals: &[Self],
        chain_index: Option<u32>,
    ) -> Result<()>;

    /// This value as a complex number, for comparisons.
    fn to_complex(self) -> Complex<f64>;
}

impl Encodable for i32 {
    fn encode_slice(
        encoder: &dyn AbstractEncoder,
        res: &mut dyn AbstractPlaintext,
        vals: &[Self],
        chain_index: Option<u32>,
    ) -> Result<()> {
        let vals = vals.iter().map(|v| i64::from(*v)).collect::<Vec<_>>();

        encoder.encode_i64(res, &vals, chain_index)
    }

    fn to_complex(self) -> Complex<f64> {
        Complex::new(self.into(), 0.0)
    }
}

impl Encodable for i64 {
    fn encode_slice(
        encoder: &dyn AbstractEncoder,
        res: &mut dyn AbstractPlaintext,
        vals: &[Self],
        chain_index: Option<u32>,
    ) -> Result<()> {
        encoder.encode_i64(res, vals, chain_index)
    }

    fn to_complex(self) -> Complex<f64> {
        Complex::new(self as f64, 0.0)
    }
}

impl Encodable for f64 {
    fn encode_slice(
        encoder: &dyn AbstractEncoder,
        res: &mut dyn AbstractPlaintext,
        vals: &[Self],
        chain_index: Option<u32>,
    ) -> Result<()> {
        encoder.encode_f64(res, vals, chain_index)
    }

    fn to_complex(self) -> Complex<f64> {
        Complex::new(self, 0.0)
    }
}

impl Encodable for Complex<f64> {
    fn encode_slice(
        encoder: &dyn AbstractEncoder,
        res: &mut dyn AbstractPlaintext,
        vals: &[Self],
        chain_index: Option<u32>,
    ) -> Result<()> {
        encoder.encode_complex(res, vals, chain_index)
    }

    fn to_complex(self) -> Complex<f64> {
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
/// The deviation of decrypted values from their expected values.
pub struct ErrorStats {
    /// The largest absolute difference.
    pub max_abs: f64,

    /// The mean absolute difference.
    pub mean_abs: f64,

    /// The largest relative difference.
    pub max_rel: f64,

    /// The mean relative difference.
    pub mean_rel: f64,
}

/// The difference relative to the actual value, or the expected magnitude where the actual
/// value is zero.
fn relative_diff(diff: f64, actual: Complex<f64>, expected: Complex<f64>) -> f64 {
    let norm = actual.norm();

    if norm == 0.0 {
        expected.norm()
    } else {
        diff / norm
    }
}

/// Compares decoded values against the expected prefix.
///
/// # Remarks
/// A slot fails when its absolute difference (or relative difference, with `percent`)
/// exceeds `eps`. Returns the largest absolute difference.
pub(crate) fn check_equals(
    title: &str,
    vals: &[Complex<f64>],
    expected: &[Complex<f64>],
    eps: f64,
    percent: bool,
) -> Result<f64> {
    if expected.len() > vals.len() {
        return Err(Error::InvalidArgument(format!(
            "{title}: {} expected values but only {} slots",
            expected.len(),
            vals.len()
        )));
    }

    let mut max_diff = 0f64;

    for (slot, (v, e)) in vals.iter().zip(expected).enumerate() {
        let diff = (v - e).norm();
        let rel = relative_diff(diff, *v, *e);

        if (percent && rel > eps) || (!percent && diff > eps) {
            error!(
                "Assert equals failed: {title}, at slot {slot}, expected {e}, actual {v}, diff {diff}, relative diff {rel}, eps {eps}"
            );

            return Err(Error::AssertEqualsFailed {
                title: title.to_owned(),
                slot,
                expected: *e,
                actual: *v,
                diff,
                relative_diff: rel,
                eps,
            });
        }

        max_diff = max_diff.max(diff);
    }

    Ok(max_diff)
}

/// Converts native values to and from plaintexts and ciphertexts.
///
/// # Remarks
/// Encoding and decoding need no keys. Encryption needs the context's public key and
/// decryption its secret key. Inputs shorter than the slot count are zero padded.
///
/// # Example
/// ```rust
/// use hebase::{CKKS_NOT_SECURE_512_FAST, CTile, Encoder, MockupCkksContext};
///
/// let he = MockupCkksContext::init(&CKKS_NOT_SECURE_512_FAST).unwrap();
/// let enc = Encoder::new(&he);
///
/// let mut c = CTile::new(&he);
/// enc.encode_encrypt(&mut c, &[1.0, 2.0, 3.0], None).unwrap();
/// c.multiply(&c.clone()).unwrap();
///
/// enc.assert_equals(&c, "squares", &[1.0, 4.0, 9.0], 1e-6, false).unwrap();
/// ```
pub struct Encoder {
    inner: Box<dyn AbstractEncoder>,
    slot_count: usize,
    top_chain_index: Option<u32>,
}

impl Encoder {
    /// Creates an encoder for the given context.
    pub fn new(he: &dyn HeContext) -> Self {
        Self {
            inner: he.encoder(),
            slot_count: he.slot_count(),
            top_chain_index: he.top_chain_index(),
        }
    }

    /// The backend representation.
    pub fn as_abstract(&self) -> &dyn AbstractEncoder {
        self.inner.as_ref()
    }

    /// Resolves the chain index to encode at.
    ///
    /// # Remarks
    /// `None` means the top of the chain. Schemes without chain indices accept anything and
    /// resolve to `None`.
    ///
    /// # Errors
    /// [`Error::InvalidChainIndex`] if `chain_index` is above the top.
    pub fn validate_chain_index(&self, chain_index: Option<u32>) -> Result<Option<u32>> {
        match (chain_index, self.top_chain_index) {
            (_, None) => Ok(None),
            (None, top) => Ok(top),
            (Some(requested), Some(max)) if requested > max => {
                Err(Error::InvalidChainIndex { requested, max })
            }
            (requested, _) => Ok(requested),
        }
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.slot_count {
            return Err(Error::TooManyValues {
                len,
                slots: self.slot_count,
            });
        }

        Ok(())
    }

    /// Encodes `vals` into `res` at the given chain index (the top when `None`).
    ///
    /// # Errors
    /// [`Error::TooManyValues`] if `vals` is longer than the slot count.
    pub fn encode<T: Encodable>(
        &self,
        res: &mut PTile,
        vals: &[T],
        chain_index: Option<u32>,
    ) -> Result<()> {
        self.check_len(vals.len())?;
        let chain_index = self.validate_chain_index(chain_index)?;

        T::encode_slice(self.as_abstract(), res.as_abstract_mut(), vals, chain_index)
    }

    /// Encodes `val` into every slot of `res`.
    pub fn encode_scalar<T: Encodable>(
        &self,
        res: &mut PTile,
        val: T,
        chain_index: Option<u32>,
    ) -> Result<()> {
        self.encode(res, &vec![val; self.slot_count], chain_index)
    }

    /// Encodes `vals` and encrypts the result into `res`.
    pub fn encode_encrypt<T: Encodable>(
        &self,
        res: &mut CTile,
        vals: &[T],
        chain_index: Option<u32>,
    ) -> Result<()> {
        let mut plain = PTile::new(res.context());
        self.encode(&mut plain, vals, chain_index)?;

        self.encrypt(res, &plain)
    }

    /// Encrypts `src` into `res`.
    pub fn encrypt(&self, res: &mut CTile, src: &PTile) -> Result<()> {
        self.inner.encrypt(res.as_abstract_mut(), src.as_abstract())
    }

    /// Decrypts `src` into `res`.
    pub fn decrypt(&self, res: &mut PTile, src: &CTile) -> Result<()> {
        self.inner.decrypt(res.as_abstract_mut(), src.as_abstract())
    }

    /// Decodes every slot as a real number.
    pub fn decode_f64(&self, src: &PTile) -> Result<Vec<f64>> {
        self.inner.decode_f64(src.as_abstract())
    }

    /// Decodes every slot as a complex number.
    pub fn decode_complex(&self, src: &PTile) -> Result<Vec<Complex<f64>>> {
        self.inner.decode_complex(src.as_abstract())
    }

    /// Decodes every slot as an integer.
    pub fn decode_i64(&self, src: &PTile) -> Result<Vec<i64>> {
        self.inner.decode_i64(src.as_abstract())
    }

    /// Decodes every slot as an `i32`.
    ///
    /// # Errors
    /// [`Error::MalformedData`] if a slot doesn't fit.
    pub fn decode_i32(&self, src: &PTile) -> Result<Vec<i32>> {
        self.decode_i64(src)?
            .into_iter()
            .map(|v| {
                i32::try_from(v)
                    .map_err(|_| Error::MalformedData(format!("slot value {v} exceeds i32")))
            })
            .collect()
    }

    fn decrypt_plain(&self, src: &CTile) -> Result<PTile> {
        let mut plain = PTile::new(src.context());
        self.decrypt(&mut plain, src)?;

        Ok(plain)
    }

    /// Decrypts `src` and decodes every slot as a real number.
    pub fn decrypt_decode_f64(&self, src: &CTile) -> Result<Vec<f64>> {
        self.decode_f64(&self.decrypt_plain(src)?)
    }

    /// Decrypts `src` and decodes every slot as a complex number.
    pub fn decrypt_decode_complex(&self, src: &CTile) -> Result<Vec<Complex<f64>>> {
        self.decode_complex(&self.decrypt_plain(src)?)
    }

    /// Decrypts `src` and decodes every slot as an integer.
    pub fn decrypt_decode_i64(&self, src: &CTile) -> Result<Vec<i64>> {
        self.decode_i64(&self.decrypt_plain(src)?)
    }

    /// Decrypts `src` and decodes every slot as an `i32`.
    pub fn decrypt_decode_i32(&self, src: &CTile) -> Result<Vec<i32>> {
        self.decode_i32(&self.decrypt_plain(src)?)
    }

    /// Decrypts `c` and compares its leading slots against `expected`.
    ///
    /// # Remarks
    /// Returns the largest absolute difference. The failing slot is logged before the
    /// error is returned. On modular schemes slots decode to residues in `[0, p^r)`, so
    /// `expected` must hold residues too.
    ///
    /// # Errors
    /// [`Error::AssertEqualsFailed`] if a slot differs by more than `eps` (relatively when
    /// `percent` is set) and [`Error::InvalidArgument`] if `expected` is longer than the
    /// slot count.
    pub fn assert_equals<T: Encodable>(
        &self,
        c: &CTile,
        title: &str,
        expected: &[T],
        eps: f64,
        percent: bool,
    ) -> Result<f64> {
        let vals = self.decrypt_decode_complex(c)?;
        let expected = expected.iter().map(|e| e.to_complex()).collect::<Vec<_>>();

        check_equals(title, &vals, &expected, eps, percent)
    }

    /// Like [`Encoder::assert_equals`] for a plaintext.
    pub fn assert_equals_plain<T: Encodable>(
        &self,
        p: &PTile,
        title: &str,
        expected: &[T],
        eps: f64,
        percent: bool,
    ) -> Result<f64> {
        let vals = self.decode_complex(p)?;
        let expected = expected.iter().map(|e| e.to_complex()).collect::<Vec<_>>();

        check_equals(title, &vals, &expected, eps, percent)
    }

    /// Measures how far the leading slots of `c` are from `expected`.
    pub fn error_stats<T: Encodable>(&self, c: &CTile, expected: &[T]) -> Result<ErrorStats> {
        let vals = self.decrypt_decode_complex(c)?;

        if expected.len() > vals.len() {
            return Err(Error::InvalidArgument(format!(
                "{} expected values but only {} slots",
                expected.len(),
                vals.len()
            )));
        }

        let mut stats = ErrorStats::default();

        if expected.is_empty() {
            return Ok(stats);
        }

        for (v, e) in vals.iter().zip(expected) {
            let e = e.to_complex();
            let diff = (v - e).norm();
            let rel = relative_diff(diff, *v, e);

            stats.max_abs = stats.max_abs.max(diff);
            stats.max_rel = stats.max_rel.max(rel);
            stats.mean_abs += diff;
            stats.mean_rel += rel;
        }

        stats.mean_abs /= expected.len() as f64;
        stats.mean_rel /= expected.len() as f64;

        Ok(stats)
    }

    /// Writes [`Encoder::error_stats`] as text or as a single CSV row.
    pub fn print_error_stats<T: Encodable>(
        &self,
        c: &CTile,
        expected: &[T],
        as_csv: bool,
        out: &mut dyn Write,
    ) -> Result<()> {
        let stats = self.error_stats(c, expected)?;

        if as_csv {
            writeln!(
                out,
                "{},{},{},{}",
                stats.max_abs, stats.mean_abs, stats.max_rel, stats.mean_rel
            )?;
        } else {
            writeln!(out, "Max absolute error: {}", stats.max_abs)?;
            writeln!(out, "Mean absolute error: {}", stats.mean_abs)?;
            writeln!(out, "Max relative error: {}", stats.max_rel)?;
            writeln!(out, "Mean relative error: {}", stats.mean_rel)?;
        }

        Ok(())
    }

    /// See [`AbstractEncoder::set_default_scale`].
    pub fn set_default_scale(&mut self, scale: f64) -> Result<()> {
        self.inner.set_default_scale(scale)
    }

    /// See [`AbstractEncoder::default_scale`].
    pub fn default_scale(&self) -> Result<f64> {
        self.inner.default_scale()
    }

    /// See [`AbstractEncoder::restore_default_scale`].
    pub fn restore_default_scale(&mut self) -> Result<()> {
        self.inner.restore_default_scale()
    }

    /// See [`AbstractEncoder::set_decrypt_added_noise_enabled`].
    pub fn set_decrypt_added_noise_enabled(&mut self, enabled: bool) -> Result<()> {
        self.inner.set_decrypt_added_noise_enabled(enabled)
    }

    /// See [`AbstractEncoder::decrypt_added_noise_enabled`].
    pub fn decrypt_added_noise_enabled(&self) -> bool {
        self.inner.decrypt_added_noise_enabled()
    }

    /// See [`AbstractEncoder::set_decrypt_added_noise_precision`].
    pub fn set_decrypt_added_noise_precision(&mut self, bits: u32) -> Result<()> {
        self.inner.set_decrypt_added_noise_precision(bits)
    }

    /// See [`AbstractEncoder::decrypt_added_noise_precision`].
    pub fn decrypt_added_noise_precision(&self) -> Result<u32> {
        self.inner.decrypt_added_noise_precision()
    }
}
