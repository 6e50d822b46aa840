//! Response transformers
//!
//! A transformer turns one raw JSON value from the API into a domain value.
//! The fetch layer stays agnostic of concrete types: every verb takes the
//! transformer to apply to its response body (or to each list item).
//!
//! Plain closures `Fn(Value) -> Result<T>` are transformers. Implement the
//! trait directly when the conversion has to await something.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::Result;

/// Converts a raw JSON value into `T`, possibly asynchronously.
#[async_trait]
pub trait Transformer<T>: Send + Sync {
    async fn transform(&self, raw: Value) -> Result<T>;
}

#[async_trait]
impl<T, F> Transformer<T> for F
where
    F: Fn(Value) -> Result<T> + Send + Sync,
    T: Send + 'static,
{
    async fn transform(&self, raw: Value) -> Result<T> {
        self(raw)
    }
}

/// Deserializes with serde.
pub struct JsonTransformer<T>(PhantomData<fn() -> T>);

impl<T> JsonTransformer<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonTransformer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Transformer<T> for JsonTransformer<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn transform(&self, raw: Value) -> Result<T> {
        Ok(serde_json::from_value(raw)?)
    }
}

/// Returns the raw value untouched.
pub struct Identity;

#[async_trait]
impl Transformer<Value> for Identity {
    async fn transform(&self, raw: Value) -> Result<Value> {
        Ok(raw)
    }
}
