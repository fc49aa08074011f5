//! Embeddable event store: an append-only log of Event Streams with
//! optimistic concurrency control, and a synchronous publish/subscribe
//! broker notifying in-process subscribers as events get appended.
//!
//! ## Overview
//!
//! Applications usually hold a single [`Client`] per process, built on top
//! of a [`Repository`] implementation (such as the [`InMemory`] one) and a
//! [`Codec`] converting Domain Events into [`SerializedRecord`]s.
//!
//! Publishing appends the event to its stream, checking the
//! [`ExpectedVersion`], and then dispatches it to the subscribers
//! registered on the [`Broker`], on the publisher thread.
//! [`Client::within`] allows to subscribe for the duration of a block only,
//! on the calling thread only.
//!
//! [`Client`]: client::Client
//! [`Client::within`]: client::Client::within
//! [`Repository`]: repository::Repository
//! [`InMemory`]: repository::InMemory
//! [`Codec`]: codec::Codec
//! [`SerializedRecord`]: codec::SerializedRecord
//! [`ExpectedVersion`]: version::ExpectedVersion
//! [`Broker`]: broker::Broker

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod client;
pub mod clock;
pub mod codec;
pub mod config;
pub mod event;
pub mod repository;
pub mod serde;
pub mod specification;
pub mod tracing;
pub mod version;

pub use crate::broker::{Broker, Handler, Subscriber, Unsubscribe};
pub use crate::client::{Client, ClientBuilder, Error};
pub use crate::codec::{Codec, SerializedRecord};
pub use crate::event::{Data, DomainEvent, Event, Metadata};
pub use crate::repository::{Repository, Start, GLOBAL_STREAM};
pub use crate::version::{ExpectedVersion, Position};
