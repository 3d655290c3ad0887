use std::{
    any::Any,
    fmt::Debug,
    io::{Read, Write},
};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    AbstractCiphertext, AbstractPlaintext, Error, HeContext, Result,
    safe_bincode::{self, GetSize},
};

use super::{MockupContext, MockupPlaintext, MockupScheme};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CipherData<T> {
    pub key_fingerprint: u64,
    pub chain_index: u32,
    pub scale: f64,
    pub slots: Vec<T>,
}

pub(crate) fn check_tile_shape<S: MockupScheme>(
    scheme: &S,
    chain_index: u32,
    scale: f64,
    slots: &[S::Slot],
) -> Result<()> {
    if slots.len() != scheme.slot_count() {
        return Err(Error::MalformedData(format!(
            "expected {} slots, found {}",
            scheme.slot_count(),
            slots.len()
        )));
    }

    if chain_index > scheme.top_chain_index() {
        return Err(Error::MalformedData(format!(
            "chain index {chain_index} above top {}",
            scheme.top_chain_index()
        )));
    }

    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::MalformedData(format!("invalid scale {scale}")));
    }

    if !slots.iter().all(|s| scheme.is_valid(s)) {
        return Err(Error::MalformedData("slot value out of range".to_owned()));
    }

    Ok(())
}

pub(crate) fn tile_size<S: MockupScheme>(scheme: &S) -> usize {
    // Option tag, fingerprint, chain index, scale and the slot sequence's length.
    1 + size_of::<u64>()
        + size_of::<u32>()
        + size_of::<f64>()
        + size_of::<u64>()
        + scheme.slot_count() * size_of::<S::Slot>()
}

impl<S: MockupScheme> GetSize<S> for Option<CipherData<S::Slot>> {
    fn get_size(params: &S) -> usize {
        tile_size(params)
    }

    fn check_is_valid(&self, params: &S) -> Result<()> {
        match self {
            Some(data) => check_tile_shape(params, data.chain_index, data.scale, &data.slots),
            None => Ok(()),
        }
    }
}

/// The chain index and scale bookkeeping of one operand, with its slots.
struct Operand<'a, T> {
    chain_index: u32,
    scale: f64,
    slots: &'a [T],
}

fn align_chain(left: u32, right: u32, strict: bool) -> Result<u32> {
    if strict && left != right {
        return Err(Error::ChainIndexMismatch { left, right });
    }

    Ok(left.min(right))
}

fn check_scales(left: f64, right: f64) -> Result<()> {
    if (left - right).abs() > 1e-9 * left.abs().max(right.abs()) {
        return Err(Error::ScaleMismatch { left, right });
    }

    Ok(())
}

/// A mockup ciphertext. Slot values are held unencrypted.
pub struct MockupCiphertext<S: MockupScheme> {
    he: MockupContext<S>,
    pub(crate) data: Option<CipherData<S::Slot>>,
}

impl<S: MockupScheme> Clone for MockupCiphertext<S> {
    fn clone(&self) -> Self {
        Self {
            he: self.he.clone(),
            data: self.data.clone(),
        }
    }
}

impl<S: MockupScheme> Debug for MockupCiphertext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("MockupCiphertext");

        match &self.data {
            Some(data) => s
                .field("chain_index", &data.chain_index)
                .field("scale", &data.scale)
                .finish_non_exhaustive(),
            None => s.field("empty", &true).finish(),
        }
    }
}

impl<S: MockupScheme> MockupCiphertext<S> {
    pub(crate) fn new(he: MockupContext<S>) -> Self {
        Self { he, data: None }
    }

    pub(crate) fn mockup_context(&self) -> &MockupContext<S> {
        &self.he
    }

    fn data(&self) -> Result<&CipherData<S::Slot>> {
        self.data.as_ref().ok_or(Error::EmptyTile)
    }

    fn cipher_operand<'a>(
        &self,
        other: &'a dyn AbstractCiphertext,
    ) -> Result<Operand<'a, S::Slot>> {
        let other = other
            .as_any()
            .downcast_ref::<Self>()
            .ok_or(Error::SchemeMismatch)?;

        if !self.he.same_context(&other.he) {
            return Err(Error::ContextMismatch);
        }

        let data = other.data()?;

        Ok(Operand {
            chain_index: data.chain_index,
            scale: data.scale,
            slots: &data.slots,
        })
    }

    fn plain_operand<'a>(&self, plain: &'a dyn AbstractPlaintext) -> Result<Operand<'a, S::Slot>> {
        let plain = plain
            .as_any()
            .downcast_ref::<MockupPlaintext<S>>()
            .ok_or(Error::SchemeMismatch)?;

        if !self.he.same_context(plain.mockup_context()) {
            return Err(Error::ContextMismatch);
        }

        let data = plain.data.as_ref().ok_or(Error::EmptyTile)?;

        Ok(Operand {
            chain_index: data.chain_index,
            scale: data.scale,
            slots: &data.slots,
        })
    }

    /// Adds or subtracts `operand`. Scales must agree unless `retarget_scale` is set, which
    /// reinterprets a plaintext at this ciphertext's scale.
    fn additive(
        &mut self,
        operand: Operand<'_, S::Slot>,
        raw: bool,
        retarget_scale: bool,
        op: fn(&S, S::Slot, S::Slot) -> S::Slot,
    ) -> Result<()> {
        let traits = self.he.scheme().traits();
        let data = self.data.as_mut().ok_or(Error::EmptyTile)?;

        let chain_index = align_chain(
            data.chain_index,
            operand.chain_index,
            raw && !traits.automatically_manages_chain_indices,
        )?;

        if !retarget_scale {
            check_scales(data.scale, operand.scale)?;
        }

        data.chain_index = chain_index;
        self.he.zip_with(&mut data.slots, operand.slots, op);

        Ok(())
    }

    /// Multiplies by `operand`, consuming a level as the scheme dictates.
    fn multiplicative(
        &mut self,
        operand: Operand<'_, S::Slot>,
        raw: bool,
        is_plain: bool,
    ) -> Result<()> {
        let scheme = self.he.scheme();
        let traits = scheme.traits();
        let data = self.data.as_mut().ok_or(Error::EmptyTile)?;

        let mut chain_index = align_chain(
            data.chain_index,
            operand.chain_index,
            raw && !traits.automatically_manages_chain_indices,
        )?;

        let operand_scale = if is_plain && !raw {
            scheme.rescale_factor()
        } else {
            operand.scale
        };
        let mut scale = data.scale * operand_scale;

        if traits.automatically_manages_rescale {
            if !is_plain {
                chain_index = chain_index
                    .checked_sub(1)
                    .ok_or(Error::ChainIndexExhausted)?;
            }
        } else if !raw {
            chain_index = chain_index
                .checked_sub(1)
                .ok_or(Error::ChainIndexExhausted)?;
            scale /= scheme.rescale_factor();
        }

        data.chain_index = chain_index;
        data.scale = scale;
        self.he.zip_with(&mut data.slots, operand.slots, S::mul);

        Ok(())
    }

    fn map(&mut self, op: fn(&S, S::Slot) -> S::Slot) -> Result<()> {
        let data = self.data.as_mut().ok_or(Error::EmptyTile)?;

        self.he.map(&mut data.slots, op);

        Ok(())
    }
}

impl<S: MockupScheme> AbstractCiphertext for MockupCiphertext<S> {
    fn clone_box(&self) -> Box<dyn AbstractCiphertext> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn context(&self) -> &dyn HeContext {
        &self.he
    }

    fn save(&self, out: &mut dyn Write) -> Result<u64> {
        let len = safe_bincode::serialize_into(out, &self.data)?;

        trace!("Saved {} ciphertext ({len} bytes)", S::HEADER_CODE);

        Ok(len)
    }

    fn load(&mut self, input: &mut dyn Read) -> Result<u64> {
        let data: Option<CipherData<S::Slot>> =
            safe_bincode::deserialize_from(input, self.he.scheme())?;
        let len = safe_bincode::serialized_size(&data)?;

        self.data = data;

        trace!("Loaded {} ciphertext ({len} bytes)", S::HEADER_CODE);

        Ok(len)
    }

    fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    fn slot_count(&self) -> usize {
        self.he.scheme().slot_count()
    }

    fn chain_index(&self) -> Option<u32> {
        self.data.as_ref().map(|data| data.chain_index)
    }

    fn scale(&self) -> Result<f64> {
        Ok(self.data()?.scale)
    }

    fn set_scale(&mut self, scale: f64) -> Result<()> {
        if !self.he.scheme().traits().supports_scaled_encoding {
            return Err(Error::NotSupported("set_scale"));
        }

        if !scale.is_finite() || scale <= 0.0 {
            return Err(Error::InvalidArgument(format!("invalid scale {scale}")));
        }

        let data = self.data.as_mut().ok_or(Error::EmptyTile)?;
        let factor = data.scale / scale;

        self.he
            .map(&mut data.slots, |scheme, a| scheme.scale_value(a, factor));
        data.scale = scale;

        Ok(())
    }

    fn add(&mut self, other: &dyn AbstractCiphertext) -> Result<()> {
        let operand = self.cipher_operand(other)?;

        self.additive(operand, false, false, S::add)
    }

    fn add_raw(&mut self, other: &dyn AbstractCiphertext) -> Result<()> {
        let operand = self.cipher_operand(other)?;

        self.additive(operand, true, false, S::add)
    }

    fn sub(&mut self, other: &dyn AbstractCiphertext) -> Result<()> {
        let operand = self.cipher_operand(other)?;

        self.additive(operand, false, false, S::sub)
    }

    fn sub_raw(&mut self, other: &dyn AbstractCiphertext) -> Result<()> {
        let operand = self.cipher_operand(other)?;

        self.additive(operand, true, false, S::sub)
    }

    fn multiply(&mut self, other: &dyn AbstractCiphertext) -> Result<()> {
        let operand = self.cipher_operand(other)?;

        self.multiplicative(operand, false, false)
    }

    fn multiply_raw(&mut self, other: &dyn AbstractCiphertext) -> Result<()> {
        let operand = self.cipher_operand(other)?;

        self.multiplicative(operand, true, false)
    }

    fn add_plain(&mut self, plain: &dyn AbstractPlaintext) -> Result<()> {
        let operand = self.plain_operand(plain)?;

        self.additive(operand, false, true, S::add)
    }

    fn add_plain_raw(&mut self, plain: &dyn AbstractPlaintext) -> Result<()> {
        let operand = self.plain_operand(plain)?;

        self.additive(operand, true, false, S::add)
    }

    fn sub_plain(&mut self, plain: &dyn AbstractPlaintext) -> Result<()> {
        let operand = self.plain_operand(plain)?;

        self.additive(operand, false, true, S::sub)
    }

    fn sub_plain_raw(&mut self, plain: &dyn AbstractPlaintext) -> Result<()> {
        let operand = self.plain_operand(plain)?;

        self.additive(operand, true, false, S::sub)
    }

    fn multiply_plain(&mut self, plain: &dyn AbstractPlaintext) -> Result<()> {
        let operand = self.plain_operand(plain)?;

        self.multiplicative(operand, false, true)
    }

    fn multiply_plain_raw(&mut self, plain: &dyn AbstractPlaintext) -> Result<()> {
        let operand = self.plain_operand(plain)?;

        self.multiplicative(operand, true, true)
    }

    fn negate(&mut self) -> Result<()> {
        self.map(S::neg)
    }

    fn conjugate(&mut self) -> Result<()> {
        self.map(S::conj)
    }

    fn conjugate_raw(&mut self) -> Result<()> {
        self.map(S::conj)
    }

    fn rotate(&mut self, n: i32) -> Result<()> {
        let data = self.data.as_mut().ok_or(Error::EmptyTile)?;
        let len = data.slots.len();

        if len > 0 {
            let k = i64::from(n).rem_euclid(len as i64) as usize;
            data.slots.rotate_left(k);
        }

        Ok(())
    }

    fn relinearize(&mut self) -> Result<()> {
        self.data()?;

        Ok(())
    }

    fn rescale(&mut self) -> Result<()> {
        self.rescale_raw()
    }

    fn rescale_raw(&mut self) -> Result<()> {
        let scheme = self.he.scheme();
        let traits = scheme.traits();
        let data = self.data.as_mut().ok_or(Error::EmptyTile)?;

        if !traits.supports_explicit_rescale || traits.automatically_manages_rescale {
            return Ok(());
        }

        data.chain_index = data
            .chain_index
            .checked_sub(1)
            .ok_or(Error::ChainIndexExhausted)?;
        data.scale /= scheme.rescale_factor();

        Ok(())
    }

    fn reduce_chain_index(&mut self) -> Result<()> {
        let data = self.data.as_mut().ok_or(Error::EmptyTile)?;

        data.chain_index = data
            .chain_index
            .checked_sub(1)
            .ok_or(Error::ChainIndexExhausted)?;

        Ok(())
    }

    fn set_chain_index(&mut self, chain_index: u32) -> Result<()> {
        let data = self.data.as_mut().ok_or(Error::EmptyTile)?;

        if chain_index > data.chain_index {
            return Err(Error::InvalidChainIndex {
                requested: chain_index,
                max: data.chain_index,
            });
        }

        data.chain_index = chain_index;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::{
        BGV_NOT_SECURE_48, CKKS_NOT_SECURE_512_FAST, CTile, Encoder, MockupBgvContext,
        MockupCkksContext, PTile,
        mockup::Ckks,
        test_utils::{get_bgv_context, get_ckks_context},
    };

    use super::*;

    fn encrypt(he: &dyn HeContext, vals: &[f64]) -> CTile {
        let enc = Encoder::new(he);
        let mut c = CTile::new(he);
        enc.encode_encrypt(&mut c, vals, None).unwrap();

        c
    }

    #[test]
    fn multiply_consumes_a_level() {
        let he = get_ckks_context();
        let top = he.top_chain_index().unwrap();

        let a = encrypt(&he, &[2.0]);
        let mut b = encrypt(&he, &[3.0]);
        b.reduce_chain_index().unwrap();

        let mut c = a.clone();
        c.multiply(&b).unwrap();

        assert_eq!(c.chain_index(), Some(top - 2));
        assert_eq!(c.scale().unwrap(), a.scale().unwrap());

        Encoder::new(&he)
            .assert_equals(&c, "product", &[6.0], 1e-6, false)
            .unwrap();
    }

    #[test]
    fn rejects_multiply_at_bottom_of_chain() {
        let he = get_ckks_context();

        let mut a = encrypt(&he, &[2.0]);
        a.set_chain_index(0).unwrap();
        let b = a.clone();

        assert!(matches!(a.multiply(&b), Err(Error::ChainIndexExhausted)));
        assert_eq!(a.chain_index(), Some(0));
    }

    #[test]
    fn raw_ops_require_aligned_operands() {
        let he = get_ckks_context();

        let a = encrypt(&he, &[2.0]);
        let mut b = encrypt(&he, &[3.0]);
        b.reduce_chain_index().unwrap();

        let mut c = a.clone();
        assert!(matches!(c.add_raw(&b), Err(Error::ChainIndexMismatch { .. })));
        assert!(matches!(
            c.multiply_raw(&b),
            Err(Error::ChainIndexMismatch { .. })
        ));

        c.add(&b).unwrap();
        assert_eq!(c.chain_index(), b.chain_index());

        let mut d = a.clone();
        d.multiply_raw(&a).unwrap();
        assert_eq!(d.chain_index(), a.chain_index());
        assert!(matches!(d.add_raw(&a), Err(Error::ScaleMismatch { .. })));

        d.rescale_raw().unwrap();

        let mut lowered = a.clone();
        lowered.reduce_chain_index().unwrap();
        d.add_raw(&lowered).unwrap();
    }

    #[test]
    fn bgv_aligns_raw_ops_automatically() {
        let he = get_bgv_context();
        let enc = Encoder::new(&he);

        let mut a = CTile::new(&he);
        enc.encode_encrypt(&mut a, &[3i64], None).unwrap();
        let mut b = a.clone();
        b.reduce_chain_index().unwrap();

        a.multiply_raw(&b).unwrap();

        assert_eq!(a.chain_index(), b.chain_index().map(|c| c - 1));
        assert_eq!(a.scale().unwrap(), 1.0);
        assert_eq!(enc.decrypt_decode_i64(&a).unwrap()[0], 9);

        assert!(matches!(a.set_scale(2.0), Err(Error::NotSupported(_))));
    }

    #[test]
    fn plain_ops_retarget_scale() {
        let he = get_ckks_context();
        let mut enc = Encoder::new(&he);
        enc.set_decrypt_added_noise_enabled(false).unwrap();

        let mut c = CTile::new(&he);
        enc.encode_encrypt(&mut c, &[1.5], None).unwrap();

        let mut p = PTile::new(&he);
        enc.set_default_scale(8.0).unwrap();
        enc.encode(&mut p, &[2.0], None).unwrap();

        assert!(matches!(c.add_plain_raw(&p), Err(Error::ScaleMismatch { .. })));

        c.add_plain(&p).unwrap();
        c.multiply_plain(&p).unwrap();

        assert_eq!(c.scale().unwrap(), he.default_scale());
        assert_eq!(enc.decrypt_decode_f64(&c).unwrap()[0], 7.0);
    }

    #[test]
    fn set_scale_reinterprets_values() {
        let he = get_ckks_context();
        let mut enc = Encoder::new(&he);
        enc.set_decrypt_added_noise_enabled(false).unwrap();

        let mut c = CTile::new(&he);
        enc.encode_encrypt(&mut c, &[3.0], None).unwrap();

        let scale = c.scale().unwrap();
        c.set_scale(scale * 2.0).unwrap();

        assert_eq!(enc.decrypt_decode_f64(&c).unwrap()[0], 1.5);
    }

    #[test]
    fn rejects_tiles_of_other_contexts() {
        let he = get_ckks_context();
        let other = MockupCkksContext::init(&CKKS_NOT_SECURE_512_FAST).unwrap();
        let bgv = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();

        let mut a = encrypt(&he, &[1.0]);
        let b = encrypt(&other, &[1.0]);

        assert!(matches!(a.add(&b), Err(Error::ContextMismatch)));

        let mut c = CTile::new(&bgv);
        Encoder::new(&bgv)
            .encode_encrypt(&mut c, &[1i64], None)
            .unwrap();

        assert!(matches!(a.add(&c), Err(Error::SchemeMismatch)));
    }

    #[test]
    fn rejects_empty_tiles() {
        let he = get_ckks_context();

        let mut a = CTile::new(&he);
        let b = encrypt(&he, &[1.0]);

        assert!(matches!(a.add(&b), Err(Error::EmptyTile)));
        assert!(matches!(a.rotate(1), Err(Error::EmptyTile)));
        assert!(a.chain_index().is_none());

        let mut b = b;
        assert!(matches!(b.add(&a), Err(Error::EmptyTile)));
    }

    #[test]
    fn can_save_and_load_ciphertext() {
        let he = get_ckks_context();

        let mut a = encrypt(&he, &[1.0, -2.0]);
        a.reduce_chain_index().unwrap();

        let mut buf = vec![];
        let written = a.save(&mut buf).unwrap();

        let mut b = CTile::new(&he);
        let read = b.load(&mut Cursor::new(buf)).unwrap();

        assert_eq!(written, read);
        assert_eq!(b.chain_index(), a.chain_index());

        let a = a.as_abstract().as_any().downcast_ref::<MockupCiphertext<Ckks>>();
        let b = b.as_abstract().as_any().downcast_ref::<MockupCiphertext<Ckks>>();
        assert_eq!(a.unwrap().data, b.unwrap().data);
    }

    #[test]
    fn rejects_malformed_ciphertext() {
        let he = get_bgv_context();
        let slots = he.slot_count();

        let data = Some(CipherData {
            key_fingerprint: 0,
            chain_index: 0,
            scale: 1.0,
            slots: vec![1000u64; slots],
        });

        let mut buf = vec![];
        safe_bincode::serialize_into(&mut buf, &data).unwrap();

        let mut c = CTile::new(&he);
        assert!(matches!(
            c.load(&mut Cursor::new(buf)),
            Err(Error::MalformedData(_))
        ));

        // Malformed length
        let buf = vec![
            1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF,
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
        ];
        assert!(c.load(&mut Cursor::new(buf)).is_err());
        assert!(c.is_empty());
    }
}
