use std::sync::OnceLock;

use crate::{BGV_NOT_SECURE_48, CKKS_NOT_SECURE_512_FAST, MockupBgvContext, MockupCkksContext};

static CKKS_CONTEXT: OnceLock<MockupCkksContext> = OnceLock::new();
static BGV_CONTEXT: OnceLock<MockupBgvContext> = OnceLock::new();

/// A shared CKKS-like context over [`CKKS_NOT_SECURE_512_FAST`]. Don't mutate it.
pub fn get_ckks_context() -> MockupCkksContext {
    CKKS_CONTEXT
        .get_or_init(|| MockupCkksContext::init(&CKKS_NOT_SECURE_512_FAST).unwrap())
        .clone()
}

/// A shared BGV-like context over [`BGV_NOT_SECURE_48`]. Don't mutate it.
pub fn get_bgv_context() -> MockupBgvContext {
    BGV_CONTEXT
        .get_or_init(|| MockupBgvContext::init(&BGV_NOT_SECURE_48).unwrap())
        .clone()
}
