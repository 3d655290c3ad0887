use std::{
    any::Any,
    fmt::Debug,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use log::trace;

use crate::{AbstractPlaintext, Error, HeContext, PTile, Result, Scalar};

/// Encodes `scalar` into every slot of a new plaintext at the given chain index.
pub(crate) fn encode_scalar(
    he: &dyn HeContext,
    scalar: Scalar,
    chain_index: Option<u32>,
) -> Result<Box<dyn AbstractPlaintext>> {
    let encoder = he.encoder();
    let mut plain = he.create_abstract_plain();

    match scalar {
        Scalar::Int(v) => {
            encoder.encode_i64(plain.as_mut(), &vec![v; he.slot_count()], chain_index)?
        }
        Scalar::Real(v) => {
            encoder.encode_f64(plain.as_mut(), &vec![v; he.slot_count()], chain_index)?
        }
    }

    Ok(plain)
}

/// Reduces a rotation offset modulo the slot count.
fn rotation_offset(exponent: u64, slots: usize) -> i32 {
    // Slot counts fit in an i32 for every supported scheme.
    (exponent % slots.max(1) as u64) as i32
}

/// The scheme-specific representation of a ciphertext.
///
/// # Remarks
/// Backends implement this trait and [`CTile`] forwards to it. Binary operations receive
/// the other operand as a trait object and must fail with [`Error::SchemeMismatch`] when it
/// belongs to another backend and [`Error::ContextMismatch`] when it belongs to another
/// context.
///
/// Operations ending in `_raw` never align chain indices or scales on schemes that don't
/// manage them automatically. They fail on misaligned operands instead.
pub trait AbstractCiphertext: Debug + Send + Sync {
    /// Returns an independent copy of this ciphertext.
    fn clone_box(&self) -> Box<dyn AbstractCiphertext>;

    /// Used to downcast to the backend's concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Used to downcast to the backend's concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The context this ciphertext was created by.
    fn context(&self) -> &dyn HeContext;

    /// Writes this ciphertext to a stream, returning the number of bytes written.
    fn save(&self, out: &mut dyn Write) -> Result<u64>;

    /// Replaces this ciphertext with one read from a stream, returning the number of bytes
    /// read.
    fn load(&mut self, input: &mut dyn Read) -> Result<u64>;

    /// Whether this ciphertext holds no value yet.
    fn is_empty(&self) -> bool;

    /// The number of slots.
    fn slot_count(&self) -> usize;

    /// The chain index, or `None` on schemes without chain indices.
    fn chain_index(&self) -> Option<u32>;

    /// The scale.
    fn scale(&self) -> Result<f64>;

    /// Sets the scale attached to this ciphertext. This changes how its content is
    /// interpreted.
    fn set_scale(&mut self, scale: f64) -> Result<()>;

    /// Adds `other` slot-wise, aligning chain indices where the scheme allows it.
    fn add(&mut self, other: &dyn AbstractCiphertext) -> Result<()>;

    /// Adds `other` slot-wise without aligning chain indices.
    fn add_raw(&mut self, other: &dyn AbstractCiphertext) -> Result<()>;

    /// Subtracts `other` slot-wise, aligning chain indices where the scheme allows it.
    fn sub(&mut self, other: &dyn AbstractCiphertext) -> Result<()>;

    /// Subtracts `other` slot-wise without aligning chain indices.
    fn sub_raw(&mut self, other: &dyn AbstractCiphertext) -> Result<()>;

    /// Multiplies by `other` slot-wise, then relinearizes and rescales.
    fn multiply(&mut self, other: &dyn AbstractCiphertext) -> Result<()>;

    /// Multiplies by `other` slot-wise without aligning chain indices or rescaling.
    fn multiply_raw(&mut self, other: &dyn AbstractCiphertext) -> Result<()>;

    /// Adds a plaintext slot-wise.
    fn add_plain(&mut self, plain: &dyn AbstractPlaintext) -> Result<()>;

    /// Adds a plaintext slot-wise without aligning chain indices or scales.
    fn add_plain_raw(&mut self, plain: &dyn AbstractPlaintext) -> Result<()>;

    /// Subtracts a plaintext slot-wise.
    fn sub_plain(&mut self, plain: &dyn AbstractPlaintext) -> Result<()>;

    /// Subtracts a plaintext slot-wise without aligning chain indices or scales.
    fn sub_plain_raw(&mut self, plain: &dyn AbstractPlaintext) -> Result<()>;

    /// Multiplies by a plaintext slot-wise, then rescales.
    fn multiply_plain(&mut self, plain: &dyn AbstractPlaintext) -> Result<()>;

    /// Multiplies by a plaintext slot-wise without aligning chain indices or rescaling.
    fn multiply_plain_raw(&mut self, plain: &dyn AbstractPlaintext) -> Result<()>;

    /// Squares every slot, then relinearizes and rescales.
    fn square(&mut self) -> Result<()> {
        let other = self.clone_box();

        self.multiply(other.as_ref())
    }

    /// Squares every slot without rescaling.
    fn square_raw(&mut self) -> Result<()> {
        let other = self.clone_box();

        self.multiply_raw(other.as_ref())
    }

    /// Adds `scalar` to every slot.
    fn add_scalar(&mut self, scalar: Scalar) -> Result<()> {
        let plain = encode_scalar(self.context(), scalar, self.chain_index())?;

        self.add_plain(plain.as_ref())
    }

    /// Multiplies every slot by `scalar`.
    fn multiply_scalar(&mut self, scalar: Scalar) -> Result<()> {
        let plain = encode_scalar(self.context(), scalar, self.chain_index())?;

        self.multiply_plain(plain.as_ref())
    }

    /// Multiplies by `factor` by only dividing the attached scale.
    fn multiply_by_changing_scale(&mut self, factor: f64) -> Result<()> {
        if factor == 0.0 || !factor.is_finite() {
            return Err(Error::InvalidArgument(format!("invalid factor {factor}")));
        }

        let scale = self.scale()?;

        self.set_scale(scale / factor)
    }

    /// Negates every slot.
    fn negate(&mut self) -> Result<()>;

    /// Conjugates every slot. A no-op on schemes without complex numbers.
    fn conjugate(&mut self) -> Result<()>;

    /// Conjugates every slot without relinearizing.
    fn conjugate_raw(&mut self) -> Result<()>;

    /// Rotates left by `n` slots: slot `i` moves to slot `i - n`.
    fn rotate(&mut self, n: i32) -> Result<()>;

    /// Relinearizes after raw multiplications.
    fn relinearize(&mut self) -> Result<()>;

    /// Divides by the last prime of the modulus chain, lowering the chain index by 1.
    fn rescale(&mut self) -> Result<()>;

    /// Rescales without relinearizing.
    fn rescale_raw(&mut self) -> Result<()>;

    /// Lowers the chain index by 1 without changing the value.
    fn reduce_chain_index(&mut self) -> Result<()>;

    /// Lowers the chain index to `chain_index` without changing the value.
    ///
    /// # Errors
    /// [`Error::InvalidChainIndex`] if `chain_index` is above the current chain index.
    fn set_chain_index(&mut self, chain_index: u32) -> Result<()>;

    /// Lowers the chain index to that of `other`.
    fn set_chain_index_like(&mut self, other: &dyn AbstractCiphertext) -> Result<()> {
        match other.chain_index() {
            Some(chain_index) => self.set_chain_index(chain_index),
            None => Ok(()),
        }
    }

    /// Adds copies of this ciphertext rotated by `rot1, 2 * rot1, 4 * rot1, ...` while the
    /// offset is below `rot2`. Rotates right instead when `reverse` is set.
    fn inner_sum(&mut self, rot1: i32, rot2: i32, reverse: bool) -> Result<()> {
        if rot1 <= 0 {
            return Err(Error::InvalidArgument(format!(
                "first rotation must be positive, got {rot1}"
            )));
        }

        let mut rot = rot1;

        while rot < rot2 {
            let mut tmp = self.clone_box();
            tmp.rotate(if reverse { -rot } else { rot })?;
            self.add(tmp.as_ref())?;

            rot = rot.saturating_mul(2);
        }

        Ok(())
    }

    /// Sums `n` consecutive slots into each slot by doubling, scanning the bits of `n` from
    /// the most significant.
    ///
    /// # Remarks
    /// Afterwards slot `i` holds `sum(slot[(i + k) % slots] for k in 0..n)`. `n == 0` leaves
    /// the ciphertext unchanged.
    fn sum_exp_by_squaring_left_to_right(&mut self, n: u32) -> Result<()> {
        if n == 0 {
            return Ok(());
        }

        let slots = self.slot_count();
        let v = self.clone_box();
        let mut e = 1u64;
        let top_bit = u32::BITS - 1 - n.leading_zeros();

        for j in (0..top_bit).rev() {
            let mut tmp = self.clone_box();
            tmp.rotate(rotation_offset(e, slots))?;
            self.add(tmp.as_ref())?;
            e *= 2;

            if (n >> j) & 1 == 1 {
                self.rotate(1)?;
                self.add(v.as_ref())?;
                e += 1;
            }
        }

        Ok(())
    }

    /// Same result as [`AbstractCiphertext::sum_exp_by_squaring_left_to_right`], scanning
    /// the bits of `n` from the least significant.
    fn sum_exp_by_squaring_right_to_left(&mut self, n: u32) -> Result<()> {
        if n == 0 {
            return Ok(());
        }

        let slots = self.slot_count();
        let mut n = n;
        let mut y: Option<Box<dyn AbstractCiphertext>> = None;
        let mut curr_exp = 1u64;

        while n > 1 {
            if n % 2 == 1 {
                y = Some(match y.take() {
                    None => self.clone_box(),
                    Some(mut prev) => {
                        prev.rotate(rotation_offset(curr_exp, slots))?;
                        let mut tmp = self.clone_box();
                        tmp.add(prev.as_ref())?;
                        tmp
                    }
                });
            }

            let mut tmp = self.clone_box();
            tmp.rotate(rotation_offset(curr_exp, slots))?;
            self.add(tmp.as_ref())?;

            curr_exp *= 2;
            n /= 2;
        }

        if let Some(mut y) = y {
            y.rotate(rotation_offset(curr_exp, slots))?;
            self.add(y.as_ref())?;
        }

        Ok(())
    }
}

#[derive(Debug)]
/// A ciphertext: an encrypted vector of values packed into the slots of a single tile.
///
/// # Remarks
/// Create one for a context with [`CTile::new`], then fill it with
/// [`crate::Encoder::encrypt`], [`crate::Encoder::encode_encrypt`] or [`CTile::load`].
/// Every operation mutates the receiver in place. Cloning yields an independent copy.
pub struct CTile {
    inner: Box<dyn AbstractCiphertext>,
}

impl Clone for CTile {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl From<Box<dyn AbstractCiphertext>> for CTile {
    fn from(inner: Box<dyn AbstractCiphertext>) -> Self {
        Self { inner }
    }
}

impl CTile {
    /// Creates an empty ciphertext for the given context.
    pub fn new(he: &dyn HeContext) -> Self {
        Self {
            inner: he.create_abstract_cipher(),
        }
    }

    /// The backend representation.
    pub fn as_abstract(&self) -> &dyn AbstractCiphertext {
        self.inner.as_ref()
    }

    /// The backend representation.
    pub fn as_abstract_mut(&mut self) -> &mut dyn AbstractCiphertext {
        self.inner.as_mut()
    }

    /// The context this ciphertext was created by.
    pub fn context(&self) -> &dyn HeContext {
        self.inner.context()
    }

    /// Whether this ciphertext holds no value yet.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The number of slots.
    pub fn slot_count(&self) -> usize {
        self.inner.slot_count()
    }

    /// The chain index, or `None` on schemes without chain indices.
    pub fn chain_index(&self) -> Option<u32> {
        self.inner.chain_index()
    }

    /// The scale.
    pub fn scale(&self) -> Result<f64> {
        self.inner.scale()
    }

    /// See [`AbstractCiphertext::set_scale`].
    pub fn set_scale(&mut self, scale: f64) -> Result<()> {
        self.inner.set_scale(scale)
    }

    /// See [`AbstractCiphertext::add`].
    pub fn add(&mut self, other: &CTile) -> Result<()> {
        self.inner.add(other.as_abstract())
    }

    /// See [`AbstractCiphertext::add_raw`].
    pub fn add_raw(&mut self, other: &CTile) -> Result<()> {
        self.inner.add_raw(other.as_abstract())
    }

    /// See [`AbstractCiphertext::sub`].
    pub fn sub(&mut self, other: &CTile) -> Result<()> {
        self.inner.sub(other.as_abstract())
    }

    /// See [`AbstractCiphertext::sub_raw`].
    pub fn sub_raw(&mut self, other: &CTile) -> Result<()> {
        self.inner.sub_raw(other.as_abstract())
    }

    /// See [`AbstractCiphertext::multiply`].
    pub fn multiply(&mut self, other: &CTile) -> Result<()> {
        self.inner.multiply(other.as_abstract())
    }

    /// See [`AbstractCiphertext::multiply_raw`].
    pub fn multiply_raw(&mut self, other: &CTile) -> Result<()> {
        self.inner.multiply_raw(other.as_abstract())
    }

    /// See [`AbstractCiphertext::add_plain`].
    pub fn add_plain(&mut self, plain: &PTile) -> Result<()> {
        self.inner.add_plain(plain.as_abstract())
    }

    /// See [`AbstractCiphertext::add_plain_raw`].
    pub fn add_plain_raw(&mut self, plain: &PTile) -> Result<()> {
        self.inner.add_plain_raw(plain.as_abstract())
    }

    /// See [`AbstractCiphertext::sub_plain`].
    pub fn sub_plain(&mut self, plain: &PTile) -> Result<()> {
        self.inner.sub_plain(plain.as_abstract())
    }

    /// See [`AbstractCiphertext::sub_plain_raw`].
    pub fn sub_plain_raw(&mut self, plain: &PTile) -> Result<()> {
        self.inner.sub_plain_raw(plain.as_abstract())
    }

    /// See [`AbstractCiphertext::multiply_plain`].
    pub fn multiply_plain(&mut self, plain: &PTile) -> Result<()> {
        self.inner.multiply_plain(plain.as_abstract())
    }

    /// See [`AbstractCiphertext::multiply_plain_raw`].
    pub fn multiply_plain_raw(&mut self, plain: &PTile) -> Result<()> {
        self.inner.multiply_plain_raw(plain.as_abstract())
    }

    /// See [`AbstractCiphertext::square`].
    pub fn square(&mut self) -> Result<()> {
        self.inner.square()
    }

    /// See [`AbstractCiphertext::square_raw`].
    pub fn square_raw(&mut self) -> Result<()> {
        self.inner.square_raw()
    }

    /// Adds `scalar` to every slot.
    pub fn add_scalar(&mut self, scalar: impl Into<Scalar>) -> Result<()> {
        self.inner.add_scalar(scalar.into())
    }

    /// Multiplies every slot by `scalar`.
    pub fn multiply_scalar(&mut self, scalar: impl Into<Scalar>) -> Result<()> {
        self.inner.multiply_scalar(scalar.into())
    }

    /// See [`AbstractCiphertext::multiply_by_changing_scale`].
    pub fn multiply_by_changing_scale(&mut self, factor: f64) -> Result<()> {
        self.inner.multiply_by_changing_scale(factor)
    }

    /// Negates every slot.
    pub fn negate(&mut self) -> Result<()> {
        self.inner.negate()
    }

    /// See [`AbstractCiphertext::conjugate`].
    pub fn conjugate(&mut self) -> Result<()> {
        self.inner.conjugate()
    }

    /// See [`AbstractCiphertext::conjugate_raw`].
    pub fn conjugate_raw(&mut self) -> Result<()> {
        self.inner.conjugate_raw()
    }

    /// Rotates left by `n` slots: slot `i` moves to slot `i - n`. Negative `n` rotates
    /// right.
    pub fn rotate(&mut self, n: i32) -> Result<()> {
        self.inner.rotate(n)
    }

    /// See [`AbstractCiphertext::relinearize`].
    pub fn relinearize(&mut self) -> Result<()> {
        self.inner.relinearize()
    }

    /// See [`AbstractCiphertext::rescale`].
    pub fn rescale(&mut self) -> Result<()> {
        self.inner.rescale()
    }

    /// See [`AbstractCiphertext::rescale_raw`].
    pub fn rescale_raw(&mut self) -> Result<()> {
        self.inner.rescale_raw()
    }

    /// See [`AbstractCiphertext::reduce_chain_index`].
    pub fn reduce_chain_index(&mut self) -> Result<()> {
        self.inner.reduce_chain_index()
    }

    /// See [`AbstractCiphertext::set_chain_index`].
    pub fn set_chain_index(&mut self, chain_index: u32) -> Result<()> {
        self.inner.set_chain_index(chain_index)
    }

    /// Lowers the chain index to that of `other`.
    pub fn set_chain_index_like(&mut self, other: &CTile) -> Result<()> {
        self.inner.set_chain_index_like(other.as_abstract())
    }

    /// See [`AbstractCiphertext::inner_sum`].
    pub fn inner_sum(&mut self, rot1: i32, rot2: i32, reverse: bool) -> Result<()> {
        self.inner.inner_sum(rot1, rot2, reverse)
    }

    /// Adds copies rotated by `1, 2, 4, ...` while below `n`. Sums all slots into every
    /// slot when `n` is the slot count and a power of two.
    pub fn inner_sum_n(&mut self, n: i32) -> Result<()> {
        self.inner.inner_sum(1, n, false)
    }

    /// See [`AbstractCiphertext::sum_exp_by_squaring_left_to_right`].
    pub fn sum_exp_by_squaring_left_to_right(&mut self, n: u32) -> Result<()> {
        self.inner.sum_exp_by_squaring_left_to_right(n)
    }

    /// See [`AbstractCiphertext::sum_exp_by_squaring_right_to_left`].
    pub fn sum_exp_by_squaring_right_to_left(&mut self, n: u32) -> Result<()> {
        self.inner.sum_exp_by_squaring_right_to_left(n)
    }

    /// Writes this ciphertext to a stream, returning the number of bytes written.
    pub fn save(&self, out: &mut dyn Write) -> Result<u64> {
        self.inner.save(out)
    }

    /// Replaces this ciphertext with one read from a stream.
    pub fn load(&mut self, input: &mut dyn Read) -> Result<u64> {
        self.inner.load(input)
    }

    /// Writes this ciphertext to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<u64> {
        let mut out = BufWriter::new(File::create(path)?);
        let len = self.save(&mut out)?;
        out.flush()?;

        trace!("Saved ciphertext to {} ({len} bytes)", path.display());

        Ok(len)
    }

    /// Replaces this ciphertext with one read from a file.
    pub fn load_from_file(&mut self, path: &Path) -> Result<u64> {
        let mut input = BufReader::new(File::open(path)?);
        let len = self.load(&mut input)?;

        trace!("Loaded ciphertext from {} ({len} bytes)", path.display());

        Ok(len)
    }

    /// Writes the metadata and, when the context can decrypt, up to `max_elements` slot
    /// values (all when `None`).
    pub fn debug_print(
        &self,
        title: &str,
        max_elements: Option<usize>,
        verbose: u32,
        out: &mut dyn Write,
    ) -> Result<()> {
        writeln!(out, "CTile {title}")?;

        if self.is_empty() {
            writeln!(out, "  <empty>")?;
            return Ok(());
        }

        writeln!(
            out,
            "  chain index: {:?}, scale: {:?}, slots: {}",
            self.chain_index(),
            self.scale().ok(),
            self.slot_count()
        )?;

        let he = self.context();

        if !he.has_secret_key() {
            writeln!(out, "  <no secret key>")?;
            return Ok(());
        }

        let encoder = he.encoder();
        let mut plain = he.create_abstract_plain();
        encoder.decrypt(plain.as_mut(), self.as_abstract())?;
        let vals = encoder.decode_complex(plain.as_ref())?;

        let shown = max_elements.unwrap_or(vals.len()).min(vals.len());

        for (i, v) in vals.iter().take(shown).enumerate() {
            if verbose > 0 || he.traits().supports_complex_numbers {
                writeln!(out, "  [{i}] {} + {}i", v.re, v.im)?;
            } else {
                writeln!(out, "  [{i}] {}", v.re)?;
            }
        }

        if shown < vals.len() {
            writeln!(out, "  ... ({} more)", vals.len() - shown)?;
        }

        Ok(())
    }
}
