//! This module provides traits and implementations for serialization and
//! deserialization of values into the opaque byte blobs carried by a
//! [SerializedRecord][crate::codec::SerializedRecord].

use std::marker::PhantomData;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// A serializer interface that can be used to serialize a Rust data type
/// into a specific wire format as a byte array.
pub trait Serializer<T>: Send + Sync {
    /// Serializes the given value into the protocol supported by this implementation.
    ///
    /// # Errors
    ///
    /// An error ([`anyhow::Error`]) is returned in case the serialization could not
    /// succeed as expected.
    fn serialize(&self, value: &T) -> anyhow::Result<Vec<u8>>;
}

/// A deserializer interface that can be used to deserialize a byte array
/// into an instance of a specific Rust data type from a specific wire format.
pub trait Deserializer<T>: Send + Sync {
    /// Deserializes the given value from a message encoded in the wire format
    /// supported by this implementation.
    ///
    /// # Errors
    ///
    /// An error ([`anyhow::Error`]) is returned in case the deserialization could not
    /// succeed as expected.
    fn deserialize(&self, data: &[u8]) -> anyhow::Result<T>;
}

/// [Serializer] and [Deserializer] that can be used to serialize into and deserialize
/// from a given type into a specific wire format.
pub trait Serde<T>: Serializer<T> + Deserializer<T> + Send + Sync {}

impl<S, T> Serde<T> for S where S: Serializer<T> + Deserializer<T> {}

/// Implements the [Serializer] and [Deserializer] traits, which use the [serde] crate
/// to serialize and deserialize a value into JSON.
#[derive(Debug)]
pub struct Json<T>(PhantomData<fn() -> T>);

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> Clone for Json<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Json<T> {}

impl<T> Serializer<T> for Json<T>
where
    T: Serialize,
{
    fn serialize(&self, value: &T) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|err| anyhow!("failed to serialize value to json: {}", err))
    }
}

impl<T> Deserializer<T> for Json<T>
where
    for<'d> T: Deserialize<'d>,
{
    fn deserialize(&self, data: &[u8]) -> anyhow::Result<T> {
        serde_json::from_slice(data)
            .map_err(|err| anyhow!("failed to deserialize value from json: {}", err))
    }
}
