use num::Complex;
use rand_distr::{Distribution, Normal};

use crate::{
    AbstractCiphertext, AbstractEncoder, AbstractPlaintext, Error, HeContext, Result,
};

use super::{
    MockupCiphertext, MockupContext, MockupPlaintext, MockupScheme, check_scale,
    ciphertext::CipherData, plaintext::PlainData,
};

/// The precision of decrypt-added noise unless configured otherwise.
pub const DEFAULT_NOISE_PRECISION: u32 = 30;

/// A mockup encoder.
///
/// # Remarks
/// The default scale and decrypt-added noise settings are local to this encoder. New
/// encoders start from the context's default scale.
pub struct MockupEncoder<S: MockupScheme> {
    he: MockupContext<S>,
    scale: f64,
    noise_enabled: bool,
    noise_precision: u32,
}

impl<S: MockupScheme> MockupEncoder<S> {
    pub(crate) fn new(he: MockupContext<S>) -> Self {
        let scale = he.default_scale();
        let noise_enabled = he.traits().supports_decrypt_added_noise;

        Self {
            he,
            scale,
            noise_enabled,
            noise_precision: DEFAULT_NOISE_PRECISION,
        }
    }

    fn plain_mut<'a>(
        &self,
        res: &'a mut dyn AbstractPlaintext,
    ) -> Result<&'a mut MockupPlaintext<S>> {
        let plain = res
            .as_any_mut()
            .downcast_mut::<MockupPlaintext<S>>()
            .ok_or(Error::SchemeMismatch)?;

        if !self.he.same_context(plain.mockup_context()) {
            return Err(Error::ContextMismatch);
        }

        Ok(plain)
    }

    fn plain<'a>(&self, src: &'a dyn AbstractPlaintext) -> Result<&'a PlainData<S::Slot>> {
        let plain = src
            .as_any()
            .downcast_ref::<MockupPlaintext<S>>()
            .ok_or(Error::SchemeMismatch)?;

        if !self.he.same_context(plain.mockup_context()) {
            return Err(Error::ContextMismatch);
        }

        plain.data()
    }

    fn encode_slots(
        &self,
        res: &mut dyn AbstractPlaintext,
        mut slots: Vec<S::Slot>,
        chain_index: Option<u32>,
    ) -> Result<()> {
        let scheme = self.he.scheme();
        let slot_count = scheme.slot_count();
        let top = scheme.top_chain_index();

        if slots.len() > slot_count {
            return Err(Error::TooManyValues {
                len: slots.len(),
                slots: slot_count,
            });
        }

        let chain_index = chain_index.unwrap_or(top);

        if chain_index > top {
            return Err(Error::InvalidChainIndex {
                requested: chain_index,
                max: top,
            });
        }

        let scale = if scheme.traits().supports_scaled_encoding {
            self.scale
        } else {
            1.0
        };

        slots.resize(slot_count, S::Slot::default());

        self.plain_mut(res)?.data = Some(PlainData {
            chain_index,
            scale,
            slots,
        });

        Ok(())
    }

    fn noise(&self) -> Result<Option<Normal<f64>>> {
        if !self.noise_enabled {
            return Ok(None);
        }

        let std_dev = (-f64::from(self.noise_precision)).exp2();

        Normal::new(0.0, std_dev)
            .map(Some)
            .map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    fn check_noise_supported(&self, what: &'static str) -> Result<()> {
        if !self.he.traits().supports_decrypt_added_noise {
            return Err(Error::NotSupported(what));
        }

        Ok(())
    }
}

impl<S: MockupScheme> AbstractEncoder for MockupEncoder<S> {
    fn encode_f64(
        &self,
        res: &mut dyn AbstractPlaintext,
        vals: &[f64],
        chain_index: Option<u32>,
    ) -> Result<()> {
        let scheme = self.he.scheme();
        let slots = vals
            .iter()
            .map(|v| scheme.from_f64(*v))
            .collect::<Result<Vec<_>>>()?;

        self.encode_slots(res, slots, chain_index)
    }

    fn encode_complex(
        &self,
        res: &mut dyn AbstractPlaintext,
        vals: &[Complex<f64>],
        chain_index: Option<u32>,
    ) -> Result<()> {
        let scheme = self.he.scheme();
        let slots = vals
            .iter()
            .map(|v| scheme.from_complex(*v))
            .collect::<Result<Vec<_>>>()?;

        self.encode_slots(res, slots, chain_index)
    }

    fn encode_i64(
        &self,
        res: &mut dyn AbstractPlaintext,
        vals: &[i64],
        chain_index: Option<u32>,
    ) -> Result<()> {
        let scheme = self.he.scheme();
        let slots = vals.iter().map(|v| scheme.from_i64(*v)).collect();

        self.encode_slots(res, slots, chain_index)
    }

    fn decode_f64(&self, src: &dyn AbstractPlaintext) -> Result<Vec<f64>> {
        let scheme = self.he.scheme();

        Ok(self
            .plain(src)?
            .slots
            .iter()
            .map(|a| scheme.to_f64(*a))
            .collect())
    }

    fn decode_complex(&self, src: &dyn AbstractPlaintext) -> Result<Vec<Complex<f64>>> {
        let scheme = self.he.scheme();

        Ok(self
            .plain(src)?
            .slots
            .iter()
            .map(|a| scheme.to_complex(*a))
            .collect())
    }

    fn decode_i64(&self, src: &dyn AbstractPlaintext) -> Result<Vec<i64>> {
        let scheme = self.he.scheme();

        Ok(self
            .plain(src)?
            .slots
            .iter()
            .map(|a| scheme.to_i64(*a))
            .collect())
    }

    fn encrypt(
        &self,
        res: &mut dyn AbstractCiphertext,
        src: &dyn AbstractPlaintext,
    ) -> Result<()> {
        let data = self.plain(src)?;

        let cipher = res
            .as_any_mut()
            .downcast_mut::<MockupCiphertext<S>>()
            .ok_or(Error::SchemeMismatch)?;

        if !self.he.same_context(cipher.mockup_context()) {
            return Err(Error::ContextMismatch);
        }

        cipher.data = Some(CipherData {
            key_fingerprint: self.he.public_key().fingerprint(),
            chain_index: data.chain_index,
            scale: data.scale,
            slots: data.slots.clone(),
        });

        Ok(())
    }

    fn decrypt(
        &self,
        res: &mut dyn AbstractPlaintext,
        src: &dyn AbstractCiphertext,
    ) -> Result<()> {
        let cipher = src
            .as_any()
            .downcast_ref::<MockupCiphertext<S>>()
            .ok_or(Error::SchemeMismatch)?;

        if !self.he.same_context(cipher.mockup_context()) {
            return Err(Error::ContextMismatch);
        }

        let data = cipher.data.as_ref().ok_or(Error::EmptyTile)?;

        if self.he.secret_key().is_none() {
            return Err(Error::NoSecretKey);
        }

        if data.key_fingerprint != self.he.public_key().fingerprint() {
            return Err(Error::KeyMismatch);
        }

        let mut slots = data.slots.clone();

        if let Some(noise) = self.noise()? {
            let scheme = self.he.scheme();
            let mut rng = rand::thread_rng();

            for a in slots.iter_mut() {
                let n = Complex::new(noise.sample(&mut rng), noise.sample(&mut rng));
                *a = scheme.perturb(*a, n);
            }
        }

        self.plain_mut(res)?.data = Some(PlainData {
            chain_index: data.chain_index,
            scale: data.scale,
            slots,
        });

        Ok(())
    }

    fn set_default_scale(&mut self, scale: f64) -> Result<()> {
        if !self.he.traits().supports_scaled_encoding {
            return Err(Error::NotSupported("set_default_scale"));
        }

        check_scale(scale)?;

        self.scale = scale;

        Ok(())
    }

    fn default_scale(&self) -> Result<f64> {
        if !self.he.traits().supports_scaled_encoding {
            return Err(Error::NotSupported("default_scale"));
        }

        Ok(self.scale)
    }

    fn restore_default_scale(&mut self) -> Result<()> {
        if !self.he.traits().supports_scaled_encoding {
            return Err(Error::NotSupported("restore_default_scale"));
        }

        self.scale = self.he.default_scale();

        Ok(())
    }

    fn set_decrypt_added_noise_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            self.check_noise_supported("decrypt added noise")?;
        }

        self.noise_enabled = enabled;

        Ok(())
    }

    fn decrypt_added_noise_enabled(&self) -> bool {
        self.noise_enabled
    }

    fn set_decrypt_added_noise_precision(&mut self, bits: u32) -> Result<()> {
        self.check_noise_supported("decrypt added noise precision")?;

        self.noise_precision = if bits == 0 {
            DEFAULT_NOISE_PRECISION
        } else {
            bits
        };

        Ok(())
    }

    fn decrypt_added_noise_precision(&self) -> Result<u32> {
        self.check_noise_supported("decrypt added noise precision")?;

        Ok(self.noise_precision)
    }
}
