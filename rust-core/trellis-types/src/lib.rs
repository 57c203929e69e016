// SPDX-License-Identifier: Apache-2.0
//! Trellis core value model.
//!
//! The types in this crate are shared by every layer of the store:
//!
//! - [`ObjectPath`] / [`PathPattern`] — hierarchical string keys and the
//!   single-segment-wildcard templates used for type resolution and queries.
//! - [`Value`] / [`Record`] — the backend-agnostic serialized form of an
//!   object's persisted fields, with a canonical JSON encoding that is
//!   stable across versions.
//!
//! Nothing here knows about storage engines or about the object protocol;
//! higher layers (`trellis-storage`, `trellis-store`) build on these types.

mod path;
mod value;

pub use path::{ObjectPath, PathError, PathPattern};
pub use value::{LiveRef, Record, Value, ValueError, ValueKind};
