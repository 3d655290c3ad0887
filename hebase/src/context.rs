use std::{
    fmt::Debug,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
    sync::Arc,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    AbstractCiphertext, AbstractEncoder, AbstractFunctionEvaluator, AbstractPlaintext,
    HeConfigRequirement, HeTraits, Result,
    error::Error,
    function_evaluator::UnsupportedFunctionEvaluator,
    mockup::{MockupBgvContext, MockupCkksContext},
    safe_bincode::{self, GetSize},
};

/// An HE library and scheme, configured, initialized and ready to start working.
///
/// # Remarks
/// Initialize one of the implementing backends (e.g. [`crate::mockup::MockupContext::init`]), then
/// continue with a generic `&dyn HeContext` or `Arc<dyn HeContext>` to stay scheme
/// oblivious.
///
/// A context either holds a public/secret key pair, allowing every operation, or only the
/// public key, allowing everything but decryption. A secret key can be loaded into a
/// public-only context later with [`HeContext::load_secret_key`].
///
/// Contexts are shared between the tiles they create and may be read from many threads,
/// but calls that mutate a context (loading keys, changing the default scale) must be
/// serialized by the caller.
pub trait HeContext: Debug + Send + Sync {
    /// The capabilities of the underlying scheme.
    fn traits(&self) -> HeTraits;

    /// Creates an empty ciphertext of this scheme. Prefer [`crate::CTile::new`].
    fn create_abstract_cipher(&self) -> Box<dyn AbstractCiphertext>;

    /// Creates an empty plaintext of this scheme. Prefer [`crate::PTile::new`].
    fn create_abstract_plain(&self) -> Box<dyn AbstractPlaintext>;

    /// Creates an encoder of this scheme. Prefer [`crate::Encoder::new`].
    fn encoder(&self) -> Box<dyn AbstractEncoder>;

    /// Creates the scheme's native function evaluator. Prefer
    /// [`crate::NativeFunctionEvaluator::new`].
    ///
    /// # Remarks
    /// The default evaluator answers every call with [`Error::NotImplemented`].
    fn function_evaluator(&self) -> Box<dyn AbstractFunctionEvaluator> {
        Box::new(UnsupportedFunctionEvaluator)
    }

    /// Whether this context holds a secret key and can decrypt.
    fn has_secret_key(&self) -> bool;

    /// The number of slots in every tile created over this context.
    fn slot_count(&self) -> usize;

    /// The highest chain index, or `None` where chain indices don't apply.
    fn top_chain_index(&self) -> Option<u32>;

    /// The security level in bits.
    fn security_level(&self) -> u32;

    /// The name of the underlying library.
    fn library_name(&self) -> &'static str;

    /// The name of the underlying scheme.
    fn scheme_name(&self) -> &'static str;

    /// A signature distinguishing this context enough to pick previously stored contexts.
    fn signature(&self) -> String {
        self.scheme_name().to_owned()
    }

    /// Writes a summary of the library details and configuration.
    fn print_signature(&self, out: &mut dyn Write) -> Result<()>;

    /// Writes detailed information for debugging.
    fn debug_print(&self, title: &str, _verbose: u32, out: &mut dyn Write) -> Result<()> {
        if !title.is_empty() {
            writeln!(out, "{title}")?;
        }

        self.print_signature(out)
    }

    /// The bit size of each prime in the modulus chain.
    fn modulus_chain(&self) -> Result<Vec<u64>> {
        Err(Error::NotImplemented("modulus_chain"))
    }

    /// Whether a context of this type can satisfy the given requirements.
    fn is_config_requirement_feasible(&self, _req: &HeConfigRequirement) -> Result<bool> {
        Err(Error::NotImplemented("is_config_requirement_feasible"))
    }

    /// The scale used when encoding, where applicable.
    fn default_scale(&self) -> f64;

    /// Sets the scale used by encoders created afterwards.
    ///
    /// # Errors
    /// [`Error::NotSupported`] on schemes without scaled encoding and
    /// [`Error::InvalidArgument`] unless `scale` is positive and finite.
    fn set_default_scale(&self, scale: f64) -> Result<()>;

    /// The code identifying this backend in saved contexts.
    fn header_code(&self) -> String {
        format!("{}_{}", self.library_name(), self.scheme_name())
    }

    /// Saves this context to a stream in binary form, with or without the secret key.
    fn save(&self, out: &mut dyn Write, with_secret_key: bool) -> Result<()>;

    /// Saves the secret key alone.
    ///
    /// # Errors
    /// [`Error::NoSecretKey`] if this context doesn't have one.
    fn save_secret_key(&self, out: &mut dyn Write) -> Result<()>;

    /// Loads a secret key saved by [`HeContext::save_secret_key`].
    ///
    /// # Errors
    /// [`Error::SecretKeyAlreadyLoaded`] if this context already has a secret key and
    /// [`Error::KeyMismatch`] if the key doesn't belong to this context's public key.
    fn load_secret_key(&self, input: &mut dyn Read) -> Result<()>;

    /// Saves this context to a file. See [`HeContext::save`].
    fn save_to_file(&self, path: &Path, with_secret_key: bool) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.save(&mut out, with_secret_key)?;
        out.flush()?;

        debug!(
            "Saved {} context to {} (secret key: {with_secret_key})",
            self.header_code(),
            path.display()
        );

        Ok(())
    }

    /// Saves the secret key to a file. See [`HeContext::save_secret_key`].
    fn save_secret_key_to_file(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.save_secret_key(&mut out)?;
        out.flush()?;

        Ok(())
    }

    /// Loads the secret key from a file. See [`HeContext::load_secret_key`].
    fn load_secret_key_from_file(&self, path: &Path) -> Result<()> {
        let mut input = BufReader::new(File::open(path)?);

        self.load_secret_key(&mut input)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// The leading record of every saved context.
pub struct ContextHeader {
    /// `<library>_<scheme>`, see [`HeContext::header_code`].
    pub code: String,

    /// The default scale of the saved context.
    pub default_scale: f64,
}

impl GetSize<()> for ContextHeader {
    fn get_size(_params: &()) -> usize {
        256
    }

    fn check_is_valid(&self, _params: &()) -> Result<()> {
        if !self.default_scale.is_finite() || self.default_scale <= 0.0 {
            return Err(Error::MalformedData(format!(
                "invalid default scale {}",
                self.default_scale
            )));
        }

        Ok(())
    }
}

impl ContextHeader {
    /// The header describing `he`.
    pub fn new(he: &dyn HeContext) -> Self {
        Self {
            code: he.header_code(),
            default_scale: he.default_scale(),
        }
    }

    /// Writes this header to a stream.
    pub fn write(&self, out: &mut dyn Write) -> Result<u64> {
        safe_bincode::serialize_into(out, self)
    }

    /// Reads a header from a stream.
    pub fn read(input: &mut dyn Read) -> Result<Self> {
        safe_bincode::deserialize_from(input, &())
    }

    /// Fails unless this header was written by a backend with the given code.
    pub fn expect_code(&self, expected: &str) -> Result<()> {
        if self.code != expected {
            return Err(Error::ContextHeaderMismatch {
                expected: expected.to_owned(),
                found: self.code.clone(),
            });
        }

        Ok(())
    }
}

/// Restores a context from its header and the remainder of the stream.
pub type ContextLoader = fn(ContextHeader, &mut dyn Read) -> Result<Arc<dyn HeContext>>;

#[derive(Clone)]
/// Maps saved context headers to the backends able to load them.
///
/// # Remarks
/// [`ContextRegistry::default`] knows every backend in this crate. Register additional
/// backends to load their contexts dynamically.
pub struct ContextRegistry {
    loaders: Vec<(String, ContextLoader)>,
}

impl Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.loaders.iter().map(|(code, _)| code))
            .finish()
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();

        registry.loaders.push((
            MockupCkksContext::HEADER_CODE.to_owned(),
            MockupCkksContext::load_dyn,
        ));
        registry.loaders.push((
            MockupBgvContext::HEADER_CODE.to_owned(),
            MockupBgvContext::load_dyn,
        ));

        registry
    }
}

impl ContextRegistry {
    /// A registry without any backend.
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    /// Registers a backend for contexts whose header carries `code`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `code` is already registered.
    pub fn register(&mut self, code: &str, loader: ContextLoader) -> Result<()> {
        if self.loaders.iter().any(|(c, _)| c == code) {
            return Err(Error::InvalidArgument(format!("Duplicate context {code}")));
        }

        self.loaders.push((code.to_owned(), loader));

        Ok(())
    }

    /// Loads a context of whichever registered type the stream holds.
    pub fn load(&self, input: &mut dyn Read) -> Result<Arc<dyn HeContext>> {
        let header = ContextHeader::read(input)?;

        let (_, loader) = self
            .loaders
            .iter()
            .find(|(code, _)| *code == header.code)
            .ok_or_else(|| Error::UnknownContext(header.code.clone()))?;

        debug!("Loading {} context", header.code);

        loader(header, input)
    }

    /// Loads a context of whichever registered type the file holds.
    pub fn load_from_file(&self, path: &Path) -> Result<Arc<dyn HeContext>> {
        let mut input = BufReader::new(File::open(path)?);

        self.load(&mut input)
    }
}

/// Loads a context of any type known to this crate from a stream.
pub fn load_he_context(input: &mut dyn Read) -> Result<Arc<dyn HeContext>> {
    ContextRegistry::default().load(input)
}

/// Loads a context of any type known to this crate from a file.
pub fn load_he_context_from_file(path: &Path) -> Result<Arc<dyn HeContext>> {
    ContextRegistry::default().load_from_file(path)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{BGV_NOT_SECURE_48, test_utils::get_ckks_context};

    #[test]
    fn can_load_context_dynamically() {
        let he = get_ckks_context();

        let mut buf = vec![];
        he.save(&mut buf, false).unwrap();

        let loaded = load_he_context(&mut Cursor::new(buf)).unwrap();

        assert_eq!(loaded.header_code(), he.header_code());
        assert_eq!(loaded.slot_count(), he.slot_count());
        assert_eq!(loaded.top_chain_index(), he.top_chain_index());
        assert!(!loaded.has_secret_key());
    }

    #[test]
    fn rejects_unknown_context() {
        let header = ContextHeader {
            code: "Nothing_Here".to_owned(),
            default_scale: 1.0,
        };

        let mut buf = vec![];
        header.write(&mut buf).unwrap();

        let res = load_he_context(&mut Cursor::new(buf));

        assert!(matches!(res, Err(Error::UnknownContext(code)) if code == "Nothing_Here"));
    }

    #[test]
    fn rejects_context_of_other_scheme() {
        let he = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();

        let mut buf = vec![];
        he.save(&mut buf, true).unwrap();

        let res = MockupCkksContext::load(&mut Cursor::new(buf));

        assert!(matches!(res, Err(Error::ContextHeaderMismatch { .. })));
    }

    #[test]
    fn rejects_duplicate_registration() {
        let mut registry = ContextRegistry::default();

        let res = registry.register(MockupCkksContext::HEADER_CODE, MockupCkksContext::load_dyn);

        assert!(matches!(res, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn empty_registry_knows_nothing() {
        let he = get_ckks_context();

        let mut buf = vec![];
        he.save(&mut buf, false).unwrap();

        let res = ContextRegistry::empty().load(&mut Cursor::new(buf));

        assert!(matches!(res, Err(Error::UnknownContext(_))));
    }
}
