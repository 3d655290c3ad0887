use std::{
    any::Any,
    fmt::Debug,
    io::{Read, Write},
};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    AbstractPlaintext, Error, HeContext, Result,
    safe_bincode::{self, GetSize},
};

use super::{
    MockupContext, MockupScheme,
    ciphertext::{check_tile_shape, tile_size},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PlainData<T> {
    pub chain_index: u32,
    pub scale: f64,
    pub slots: Vec<T>,
}

impl<S: MockupScheme> GetSize<S> for Option<PlainData<S::Slot>> {
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

/// A mockup plaintext.
pub struct MockupPlaintext<S: MockupScheme> {
    he: MockupContext<S>,
    pub(crate) data: Option<PlainData<S::Slot>>,
}

impl<S: MockupScheme> Clone for MockupPlaintext<S> {
    fn clone(&self) -> Self {
        Self {
            he: self.he.clone(),
            data: self.data.clone(),
        }
    }
}

impl<S: MockupScheme> Debug for MockupPlaintext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockupPlaintext")
            .field("data", &self.data)
            .finish()
    }
}

impl<S: MockupScheme> MockupPlaintext<S> {
    pub(crate) fn new(he: MockupContext<S>) -> Self {
        Self { he, data: None }
    }

    pub(crate) fn mockup_context(&self) -> &MockupContext<S> {
        &self.he
    }

    pub(crate) fn data(&self) -> Result<&PlainData<S::Slot>> {
        self.data.as_ref().ok_or(Error::EmptyTile)
    }
}

impl<S: MockupScheme> AbstractPlaintext for MockupPlaintext<S> {
    fn clone_box(&self) -> Box<dyn AbstractPlaintext> {
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

        trace!("Saved {} plaintext ({len} bytes)", S::HEADER_CODE);

        Ok(len)
    }

    fn load(&mut self, input: &mut dyn Read) -> Result<u64> {
        let data: Option<PlainData<S::Slot>> =
            safe_bincode::deserialize_from(input, self.he.scheme())?;
        let len = safe_bincode::serialized_size(&data)?;

        self.data = data;

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

    fn scale(&self) -> Result<f64> {
        Ok(self.data()?.scale)
    }
}
