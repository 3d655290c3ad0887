use std::io::{Read, Write};

use bincode::{DefaultOptions, Options};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;

/// Get the expected size of a type for safe bincode deserialization.
pub trait GetSize<P: ?Sized> {
    /// The largest serialized size admissible under the given parameters.
    fn get_size(params: &P) -> usize;

    /// Check if the given object is valid under the given parameters.
    fn check_is_valid(&self, params: &P) -> Result<()>;
}

fn options() -> impl Options {
    DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Serializes `value` to a stream, returning the number of bytes written.
pub fn serialize_into<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<u64> {
    let len = options().serialized_size(value)?;
    options().serialize_into(out, value)?;

    Ok(len)
}

/// The number of bytes [`serialize_into`] writes for `value`.
pub fn serialized_size<T: Serialize + ?Sized>(value: &T) -> Result<u64> {
    Ok(options().serialized_size(value)?)
}

/// Safely deserialize the given buffer given a type
pub fn deserialize<'a, T, P>(data: &'a [u8], params: &P) -> Result<T>
where
    T: GetSize<P> + Deserialize<'a>,
    P: ?Sized,
{
    let options = options().with_limit(T::get_size(params) as u64);

    let mut deserializer = bincode::Deserializer::from_slice(data, options);
    let result = T::deserialize(&mut deserializer)?;
    result.check_is_valid(params)?;

    Ok(result)
}

/// Safely deserialize the next value of a stream, leaving the remainder unread.
pub fn deserialize_from<T, P>(input: &mut dyn Read, params: &P) -> Result<T>
where
    T: GetSize<P> + DeserializeOwned,
    P: ?Sized,
{
    let result: T = options()
        .with_limit(T::get_size(params) as u64)
        .deserialize_from(input)?;
    result.check_is_valid(params)?;

    Ok(result)
}
