use std::{
    any::Any,
    fmt::Debug,
    io::{Read, Write},
};

use crate::{HeContext, Result};

/// The scheme-specific representation of an encoded, unencrypted tile.
pub trait AbstractPlaintext: Debug + Send + Sync {
    /// Returns an independent copy of this plaintext.
    fn clone_box(&self) -> Box<dyn AbstractPlaintext>;

    /// Used to downcast to the backend's concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Used to downcast to the backend's concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The context this plaintext was created by.
    fn context(&self) -> &dyn HeContext;

    /// Writes this plaintext to a stream, returning the number of bytes written.
    fn save(&self, out: &mut dyn Write) -> Result<u64>;

    /// Replaces this plaintext with one read from a stream.
    fn load(&mut self, input: &mut dyn Read) -> Result<u64>;

    /// Whether this plaintext holds no value yet.
    fn is_empty(&self) -> bool;

    /// The number of slots.
    fn slot_count(&self) -> usize;

    /// The chain index, or `None` on schemes without chain indices.
    fn chain_index(&self) -> Option<u32>;

    /// Lowers the chain index to `chain_index`.
    fn set_chain_index(&mut self, chain_index: u32) -> Result<()>;

    /// The scale the values were encoded with.
    fn scale(&self) -> Result<f64>;
}

#[derive(Debug)]
/// A plaintext: a vector of values encoded into the slots of a single tile.
///
/// # Remarks
/// Create one for a context with [`PTile::new`], then fill it with
/// [`crate::Encoder::encode`] or [`crate::Encoder::decrypt`].
pub struct PTile {
    inner: Box<dyn AbstractPlaintext>,
}

impl Clone for PTile {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl From<Box<dyn AbstractPlaintext>> for PTile {
    fn from(inner: Box<dyn AbstractPlaintext>) -> Self {
        Self { inner }
    }
}

impl PTile {
    /// Creates an empty plaintext for the given context.
    pub fn new(he: &dyn HeContext) -> Self {
        Self {
            inner: he.create_abstract_plain(),
        }
    }

    /// The backend representation.
    pub fn as_abstract(&self) -> &dyn AbstractPlaintext {
        self.inner.as_ref()
    }

    /// The backend representation.
    pub fn as_abstract_mut(&mut self) -> &mut dyn AbstractPlaintext {
        self.inner.as_mut()
    }

    /// The context this plaintext was created by.
    pub fn context(&self) -> &dyn HeContext {
        self.inner.context()
    }

    /// Whether this plaintext holds no value yet.
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

    /// See [`AbstractPlaintext::set_chain_index`].
    pub fn set_chain_index(&mut self, chain_index: u32) -> Result<()> {
        self.inner.set_chain_index(chain_index)
    }

    /// The scale the values were encoded with.
    pub fn scale(&self) -> Result<f64> {
        self.inner.scale()
    }

    /// Writes this plaintext to a stream, returning the number of bytes written.
    pub fn save(&self, out: &mut dyn Write) -> Result<u64> {
        self.inner.save(out)
    }

    /// Replaces this plaintext with one read from a stream.
    pub fn load(&mut self, input: &mut dyn Read) -> Result<u64> {
        self.inner.load(input)
    }

    /// Writes the metadata and up to `max_elements` decoded values (all when `None`).
    pub fn debug_print(
        &self,
        title: &str,
        max_elements: Option<usize>,
        out: &mut dyn Write,
    ) -> Result<()> {
        writeln!(out, "PTile {title}")?;

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

        let vals = self.context().encoder().decode_complex(self.as_abstract())?;
        let shown = max_elements.unwrap_or(vals.len()).min(vals.len());

        for (i, v) in vals.iter().take(shown).enumerate() {
            writeln!(out, "  [{i}] {} + {}i", v.re, v.im)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::{
        Encoder, Error,
        test_utils::{get_bgv_context, get_ckks_context},
    };

    use super::*;

    #[test]
    fn can_lower_plaintext_chain_index() {
        let he = get_ckks_context();
        let enc = Encoder::new(&he);

        let mut p = PTile::new(&he);
        enc.encode(&mut p, &[1.0, 2.0], None).unwrap();

        assert_eq!(p.chain_index(), he.top_chain_index());

        p.set_chain_index(2).unwrap();
        assert_eq!(p.chain_index(), Some(2));

        assert!(matches!(
            p.set_chain_index(3),
            Err(Error::InvalidChainIndex { requested: 3, max: 2 })
        ));
    }

    #[test]
    fn can_save_and_load_plaintext() {
        let he = get_bgv_context();
        let enc = Encoder::new(&he);

        let mut p = PTile::new(&he);
        enc.encode(&mut p, &[5i64, -1], None).unwrap();

        let mut buf = vec![];
        let written = p.save(&mut buf).unwrap();
        assert_eq!(written as usize, buf.len());

        let mut q = PTile::new(&he);
        assert!(q.is_empty());
        q.load(&mut Cursor::new(buf)).unwrap();

        let modulus = he.traits().arithmetic_modulus as i64;
        let res = enc.decode_i64(&q).unwrap();

        assert_eq!(res[0], 5);
        assert_eq!(res[1], modulus - 1);
    }

    #[test]
    fn empty_plaintext_has_no_scale() {
        let he = get_ckks_context();
        let p = PTile::new(&he);

        assert!(matches!(p.scale(), Err(Error::EmptyTile)));

        let mut out = vec![];
        p.debug_print("p", None, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("<empty>"));
    }
}
