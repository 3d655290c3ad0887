use std::{
    fmt::Debug,
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    AbstractCiphertext, AbstractEncoder, AbstractFunctionEvaluator, AbstractPlaintext,
    ContextHeader, Error, HeConfigRequirement, HeContext, HeTraits, Result,
    safe_bincode::{self, GetSize},
};

use super::{
    LIBRARY_NAME, MockupCiphertext, MockupEncoder, MockupPlaintext, MockupScheme, PublicKey,
    SecretKey, check_scale,
};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Inner<S: MockupScheme> {
    scheme: S,
    pool: ThreadPool,
    public_key: PublicKey,
    secret_key: RwLock<Option<SecretKey>>,
    default_scale: RwLock<f64>,
}

#[derive(Serialize, Deserialize)]
struct ContextBody<C> {
    config: C,
    public_key: PublicKey,
    secret_key: Option<SecretKey>,
}

impl<C: DeserializeOwned> GetSize<()> for ContextBody<C> {
    fn get_size(_params: &()) -> usize {
        4096
    }

    fn check_is_valid(&self, _params: &()) -> Result<()> {
        match &self.secret_key {
            Some(sk) if !self.public_key.matches(sk) => Err(Error::KeyMismatch),
            _ => Ok(()),
        }
    }
}

/// A mockup context over the scheme `S`.
///
/// # Remarks
/// This is a cheap handle. Clones share the same keys, thread pool and default scale, and
/// tiles created by any of them can be combined.
pub struct MockupContext<S: MockupScheme> {
    inner: Arc<Inner<S>>,
}

impl<S: MockupScheme> Clone for MockupContext<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: MockupScheme> Debug for MockupContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockupContext")
            .field("scheme", &self.inner.scheme)
            .field("has_secret_key", &self.has_secret_key())
            .finish()
    }
}

impl<S: MockupScheme> MockupContext<S> {
    /// `<library>_<scheme>`, written in the header of saved contexts.
    pub const HEADER_CODE: &'static str = S::HEADER_CODE;

    /// Builds a context from `config`, generating a fresh key pair.
    pub fn init(config: &S::Config) -> Result<Self> {
        let scheme = S::new(config)?;
        let sk = SecretKey::generate();
        let pk = PublicKey::generate(&sk);
        let default_scale = scheme.rescale_factor();

        let he = Self::from_parts(scheme, pk, Some(sk), default_scale)?;

        debug!("Initialized {} context: {}", S::HEADER_CODE, he.scheme().describe());

        Ok(he)
    }

    fn from_parts(
        scheme: S,
        public_key: PublicKey,
        secret_key: Option<SecretKey>,
        default_scale: f64,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(scheme.num_threads())
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                scheme,
                pool,
                public_key,
                secret_key: RwLock::new(secret_key),
                default_scale: RwLock::new(default_scale),
            }),
        })
    }

    /// Loads a context saved by [`HeContext::save`].
    ///
    /// # Errors
    /// [`Error::ContextHeaderMismatch`] if the stream holds a context of another backend.
    pub fn load(input: &mut dyn Read) -> Result<Self> {
        let header = ContextHeader::read(input)?;

        Self::load_body(header, input)
    }

    /// Loads a context saved by [`HeContext::save_to_file`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut input = BufReader::new(File::open(path)?);

        Self::load(&mut input)
    }

    /// Loads the remainder of a context whose header was already read. Registered with
    /// [`crate::ContextRegistry`].
    pub fn load_dyn(header: ContextHeader, input: &mut dyn Read) -> Result<Arc<dyn HeContext>> {
        Ok(Arc::new(Self::load_body(header, input)?))
    }

    fn load_body(header: ContextHeader, input: &mut dyn Read) -> Result<Self> {
        header.expect_code(S::HEADER_CODE)?;

        let body: ContextBody<S::Config> = safe_bincode::deserialize_from(input, &())?;
        let scheme = S::new(&body.config)?;
        let has_secret_key = body.secret_key.is_some();

        let he = Self::from_parts(
            scheme,
            body.public_key,
            body.secret_key,
            header.default_scale,
        )?;

        debug!(
            "Loaded {} context (secret key: {has_secret_key})",
            S::HEADER_CODE
        );

        Ok(he)
    }

    /// The parameters this context was built from.
    pub fn config(&self) -> &S::Config {
        self.inner.scheme.config()
    }

    pub(crate) fn scheme(&self) -> &S {
        &self.inner.scheme
    }

    pub(crate) fn public_key(&self) -> &PublicKey {
        &self.inner.public_key
    }

    pub(crate) fn secret_key(&self) -> Option<SecretKey> {
        read(&self.inner.secret_key).clone()
    }

    pub(crate) fn same_context(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Applies `f` slot-wise on the context's thread pool.
    pub(crate) fn map(&self, dst: &mut [S::Slot], f: impl Fn(&S, S::Slot) -> S::Slot + Sync) {
        let scheme = &self.inner.scheme;

        self.inner
            .pool
            .install(|| dst.par_iter_mut().for_each(|a| *a = f(scheme, *a)));
    }

    /// Combines `dst` with `src` slot-wise on the context's thread pool.
    pub(crate) fn zip_with(
        &self,
        dst: &mut [S::Slot],
        src: &[S::Slot],
        f: impl Fn(&S, S::Slot, S::Slot) -> S::Slot + Sync,
    ) {
        let scheme = &self.inner.scheme;

        self.inner.pool.install(|| {
            dst.par_iter_mut()
                .zip(src.par_iter())
                .for_each(|(a, b)| *a = f(scheme, *a, *b))
        });
    }
}

impl<S: MockupScheme> HeContext for MockupContext<S> {
    fn traits(&self) -> HeTraits {
        self.inner.scheme.traits()
    }

    fn create_abstract_cipher(&self) -> Box<dyn AbstractCiphertext> {
        Box::new(MockupCiphertext::new(self.clone()))
    }

    fn create_abstract_plain(&self) -> Box<dyn AbstractPlaintext> {
        Box::new(MockupPlaintext::new(self.clone()))
    }

    fn encoder(&self) -> Box<dyn AbstractEncoder> {
        Box::new(MockupEncoder::new(self.clone()))
    }

    fn function_evaluator(&self) -> Box<dyn AbstractFunctionEvaluator> {
        S::function_evaluator(self)
    }

    fn has_secret_key(&self) -> bool {
        read(&self.inner.secret_key).is_some()
    }

    fn slot_count(&self) -> usize {
        self.inner.scheme.slot_count()
    }

    fn top_chain_index(&self) -> Option<u32> {
        Some(self.inner.scheme.top_chain_index())
    }

    fn security_level(&self) -> u32 {
        self.inner.scheme.security_level()
    }

    fn library_name(&self) -> &'static str {
        LIBRARY_NAME
    }

    fn scheme_name(&self) -> &'static str {
        S::SCHEME_NAME
    }

    fn signature(&self) -> String {
        format!(
            "{} {} (mockup, not secure)",
            S::HEADER_CODE,
            self.inner.scheme.describe()
        )
    }

    fn print_signature(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(
            out,
            "{LIBRARY_NAME} {} (mockup backend, values are not encrypted)",
            S::SCHEME_NAME
        )?;
        writeln!(out, "{}", self.inner.scheme.describe())?;
        writeln!(
            out,
            "Nominal security level: {}",
            self.inner.scheme.security_level()
        )?;
        writeln!(out, "Slots: {}", self.slot_count())?;
        writeln!(
            out,
            "Secret key: {}",
            if self.has_secret_key() {
                "present"
            } else {
                "absent"
            }
        )?;

        Ok(())
    }

    fn modulus_chain(&self) -> Result<Vec<u64>> {
        self.inner.scheme.modulus_chain()
    }

    fn is_config_requirement_feasible(&self, req: &HeConfigRequirement) -> Result<bool> {
        self.inner.scheme.is_config_requirement_feasible(req)
    }

    fn default_scale(&self) -> f64 {
        *read(&self.inner.default_scale)
    }

    fn set_default_scale(&self, scale: f64) -> Result<()> {
        if !self.traits().supports_scaled_encoding {
            return Err(Error::NotSupported("set_default_scale"));
        }

        check_scale(scale)?;
        *write(&self.inner.default_scale) = scale;

        Ok(())
    }

    fn save(&self, out: &mut dyn Write, with_secret_key: bool) -> Result<()> {
        let secret_key = if with_secret_key {
            Some(self.secret_key().ok_or(Error::NoSecretKey)?)
        } else {
            None
        };

        ContextHeader::new(self).write(out)?;

        let body = ContextBody {
            config: self.inner.scheme.config().clone(),
            public_key: self.inner.public_key,
            secret_key,
        };

        safe_bincode::serialize_into(out, &body)?;

        debug!("Saved {} context (secret key: {with_secret_key})", S::HEADER_CODE);

        Ok(())
    }

    fn save_secret_key(&self, out: &mut dyn Write) -> Result<()> {
        let sk = self.secret_key().ok_or(Error::NoSecretKey)?;

        safe_bincode::serialize_into(out, &sk)?;

        Ok(())
    }

    fn load_secret_key(&self, input: &mut dyn Read) -> Result<()> {
        let sk: SecretKey = safe_bincode::deserialize_from(input, &())?;

        if !self.inner.public_key.matches(&sk) {
            return Err(Error::KeyMismatch);
        }

        let mut guard = write(&self.inner.secret_key);

        if guard.is_some() {
            return Err(Error::SecretKeyAlreadyLoaded);
        }

        *guard = Some(sk);

        debug!("Loaded secret key into {} context", S::HEADER_CODE);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::{
        BGV_NOT_SECURE_48, CKKS_NOT_SECURE_512_FAST, MockupBgvContext, MockupCkksContext,
    };

    use super::*;

    #[test]
    fn can_save_and_load_context() {
        let he = MockupCkksContext::init(&CKKS_NOT_SECURE_512_FAST).unwrap();
        he.set_default_scale(1024.0).unwrap();

        let mut buf = vec![];
        he.save(&mut buf, true).unwrap();

        let loaded = MockupCkksContext::load(&mut Cursor::new(buf)).unwrap();

        assert_eq!(loaded.config(), he.config());
        assert_eq!(loaded.default_scale(), 1024.0);
        assert!(loaded.has_secret_key());
        assert!(!loaded.same_context(&he));
    }

    #[test]
    fn rejects_secret_key_when_already_loaded() {
        let he = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();

        let mut sk = vec![];
        he.save_secret_key(&mut sk).unwrap();

        assert!(matches!(
            he.load_secret_key(&mut Cursor::new(sk)),
            Err(Error::SecretKeyAlreadyLoaded)
        ));
    }

    #[test]
    fn rejects_foreign_secret_key() {
        let he = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();
        let other = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();

        let mut buf = vec![];
        he.save(&mut buf, false).unwrap();
        let public_only = MockupBgvContext::load(&mut Cursor::new(buf)).unwrap();

        let mut sk = vec![];
        other.save_secret_key(&mut sk).unwrap();

        assert!(matches!(
            public_only.load_secret_key(&mut Cursor::new(sk)),
            Err(Error::KeyMismatch)
        ));
        assert!(!public_only.has_secret_key());
    }

    #[test]
    fn rejects_saving_missing_secret_key() {
        let he = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();

        let mut buf = vec![];
        he.save(&mut buf, false).unwrap();
        let public_only = MockupBgvContext::load(&mut Cursor::new(buf)).unwrap();

        let mut out = vec![];
        assert!(matches!(
            public_only.save_secret_key(&mut out),
            Err(Error::NoSecretKey)
        ));
        assert!(matches!(
            public_only.save(&mut out, true),
            Err(Error::NoSecretKey)
        ));
    }

    #[test]
    fn rejects_invalid_default_scale() {
        let he = MockupCkksContext::init(&CKKS_NOT_SECURE_512_FAST).unwrap();
        let initial = he.default_scale();

        for scale in [-1.0, 0.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                he.set_default_scale(scale),
                Err(Error::InvalidArgument(_))
            ));
        }

        assert_eq!(he.default_scale(), initial);

        let mut buf = vec![];
        he.save(&mut buf, false).unwrap();
        assert_eq!(
            MockupCkksContext::load(&mut Cursor::new(buf))
                .unwrap()
                .default_scale(),
            initial
        );

        let bgv = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();
        assert!(matches!(
            bgv.set_default_scale(8.0),
            Err(Error::NotSupported(_))
        ));
        assert_eq!(bgv.default_scale(), 1.0);
    }

    #[test]
    fn signature_says_not_secure() {
        let he = MockupCkksContext::init(&CKKS_NOT_SECURE_512_FAST).unwrap();

        assert!(he.signature().contains("not secure"));

        let mut out = vec![];
        he.debug_print("ctx", 0, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.starts_with("ctx\n"));
        assert!(out.contains("Secret key: present"));
    }

    #[test]
    fn can_report_modulus_chain() {
        let he = MockupCkksContext::init(&CKKS_NOT_SECURE_512_FAST).unwrap();
        let chain = he.modulus_chain().unwrap();

        assert_eq!(chain.len(), CKKS_NOT_SECURE_512_FAST.multiplication_depth as usize + 1);
        assert_eq!(chain[0], 50);
        assert!(chain[1..].iter().all(|bits| *bits == 40));

        let bgv = MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap();
        assert!(matches!(bgv.modulus_chain(), Err(Error::NotImplemented(_))));
    }
}
