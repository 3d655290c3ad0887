use std::{
    env,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// The requirements a CKKS-like context is initialized from.
///
/// # Remarks
/// The fractional part precision doubles as the bit size of every prime in the modulus
/// chain below the first, so a ciphertext's scale returns to `2^fractional_part_precision`
/// after each rescale. The first prime additionally holds the integer part.
pub struct HeConfigRequirement {
    /// The requested security level in bits.
    pub security_level: u32,

    /// Bits of precision kept left of the binary point.
    pub integer_part_precision: u32,

    /// Bits of precision kept right of the binary point.
    pub fractional_part_precision: u32,

    /// The number of slots in each tile. Must be a power of two.
    pub num_slots: usize,

    /// The number of sequential multiplications supported, i.e. the top chain index.
    pub multiplication_depth: u32,

    /// The size of the thread pool used for slot-wise arithmetic.
    pub num_threads: usize,
}

impl Default for HeConfigRequirement {
    fn default() -> Self {
        CKKS_NOT_SECURE_512_FAST
    }
}

/// A small, fast CKKS-like configuration for tests and tutorials.
///
/// # Remarks
/// Makes no security claim.
pub const CKKS_NOT_SECURE_512_FAST: HeConfigRequirement = HeConfigRequirement {
    security_level: 0,
    integer_part_precision: 10,
    fractional_part_precision: 40,
    num_slots: 512,
    multiplication_depth: 8,
    num_threads: 1,
};

/// A CKKS-like configuration with 8192 slots and low multiplication depth.
pub const CKKS_8192: HeConfigRequirement = HeConfigRequirement {
    security_level: 128,
    integer_part_precision: 10,
    fractional_part_precision: 40,
    num_slots: 8192,
    multiplication_depth: 4,
    num_threads: 1,
};

/// A CKKS-like configuration with 16384 slots and high multiplication depth.
pub const CKKS_16384: HeConfigRequirement = HeConfigRequirement {
    security_level: 128,
    integer_part_precision: 10,
    fractional_part_precision: 50,
    num_slots: 16384,
    multiplication_depth: 12,
    num_threads: 1,
};

impl HeConfigRequirement {
    /// Checks that a context can be built from these requirements.
    pub fn validate(&self) -> Result<()> {
        if self.num_slots == 0 || !self.num_slots.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "slot count must be a nonzero power of two, got {}",
                self.num_slots
            )));
        }

        if self.fractional_part_precision == 0 || self.fractional_part_precision > 60 {
            return Err(Error::InvalidConfig(format!(
                "fractional part precision must be in 1..=60, got {}",
                self.fractional_part_precision
            )));
        }

        if self.integer_part_precision + self.fractional_part_precision > 120 {
            return Err(Error::InvalidConfig(
                "total precision must not exceed 120 bits".to_owned(),
            ));
        }

        if self.num_threads == 0 {
            return Err(Error::InvalidConfig("thread count must be positive".to_owned()));
        }

        Ok(())
    }

    /// Parses requirements from JSON. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    /// Reads requirements from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// The parameters a BGV-like context is initialized from.
pub struct BgvConfig {
    /// The plaintext prime modulus.
    pub p: u64,

    /// The Hensel lifting exponent. Slots hold values modulo `p^r`.
    pub r: u32,

    /// The number of slots in each tile.
    pub num_slots: usize,

    /// The number of sequential multiplications supported, i.e. the top chain index.
    pub depth: u32,

    /// The requested security level in bits.
    pub security_level: u32,

    /// The size of the thread pool used for slot-wise arithmetic.
    pub num_threads: usize,
}

impl Default for BgvConfig {
    fn default() -> Self {
        BGV_NOT_SECURE_48
    }
}

/// The parameters of the encrypted country lookup: 48 slots of 7-bit characters.
///
/// # Remarks
/// Makes no security claim.
pub const BGV_NOT_SECURE_48: BgvConfig = BgvConfig {
    p: 131,
    r: 1,
    num_slots: 48,
    depth: 32,
    security_level: 0,
    num_threads: 1,
};

/// A BGV-like configuration with a larger prime.
pub const BGV_NOT_SECURE_4999: BgvConfig = BgvConfig {
    p: 4999,
    r: 1,
    num_slots: 256,
    depth: 24,
    security_level: 0,
    num_threads: 1,
};

impl BgvConfig {
    /// The arithmetic modulus `p^r`.
    pub fn modulus(&self) -> Result<u64> {
        self.p
            .checked_pow(self.r)
            .filter(|m| *m < 1 << 32)
            .ok_or_else(|| {
                Error::InvalidConfig(format!("p^r = {}^{} must be below 2^32", self.p, self.r))
            })
    }

    /// Checks that a context can be built from these parameters.
    pub fn validate(&self) -> Result<()> {
        if self.r == 0 {
            return Err(Error::InvalidConfig(
                "Hensel lifting exponent must be positive".to_owned(),
            ));
        }

        self.modulus()?;

        if !is_prime(self.p) {
            return Err(Error::InvalidConfig(format!(
                "plaintext modulus {} is not prime",
                self.p
            )));
        }

        if self.num_slots == 0 {
            return Err(Error::InvalidConfig("slot count must be positive".to_owned()));
        }

        if self.num_threads == 0 {
            return Err(Error::InvalidConfig("thread count must be positive".to_owned()));
        }

        Ok(())
    }

    /// Parses parameters from JSON. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    /// Reads parameters from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }

    let mut d = 2;

    while d <= n / d {
        if n % d == 0 {
            return false;
        }

        d += 1;
    }

    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Directories used by demos and tests for their inputs and outputs.
///
/// # Remarks
/// Build this once at startup with [`HeDirs::from_env`] and pass it to whatever needs it.
pub struct HeDirs {
    /// Where examples live. `HELAYERS_EXAMPLES_DIR`, default `../examples`.
    pub examples_dir: PathBuf,

    /// Where large data sets live. `HELAYERS_DATA_SETS_DIR`, default `../examples/data`.
    pub data_sets_dir: PathBuf,

    /// Where examples write their output. `HELAYERS_EXAMPLES_OUTPUT_DIR`, default `./output`.
    pub examples_output_dir: PathBuf,

    /// Where tests write temporary files. `HELAYERS_TESTS_OUTPUT_DIR`, default `./output`.
    pub tests_output_dir: PathBuf,

    /// Where internal resources live. `HELAYERS_RESOURCES_DIR`, default `../resources`.
    pub resources_dir: PathBuf,
}

impl Default for HeDirs {
    fn default() -> Self {
        Self {
            examples_dir: PathBuf::from("../examples"),
            data_sets_dir: PathBuf::from("../examples/data"),
            examples_output_dir: PathBuf::from("./output"),
            tests_output_dir: PathBuf::from("./output"),
            resources_dir: PathBuf::from("../resources"),
        }
    }
}

impl HeDirs {
    /// Reads the directories from the environment, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var_os(key).map(PathBuf::from))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        let defaults = Self::default();

        Self {
            examples_dir: lookup("HELAYERS_EXAMPLES_DIR").unwrap_or(defaults.examples_dir),
            data_sets_dir: lookup("HELAYERS_DATA_SETS_DIR").unwrap_or(defaults.data_sets_dir),
            examples_output_dir: lookup("HELAYERS_EXAMPLES_OUTPUT_DIR")
                .unwrap_or(defaults.examples_output_dir),
            tests_output_dir: lookup("HELAYERS_TESTS_OUTPUT_DIR")
                .unwrap_or(defaults.tests_output_dir),
            resources_dir: lookup("HELAYERS_RESOURCES_DIR").unwrap_or(defaults.resources_dir),
        }
    }
}
