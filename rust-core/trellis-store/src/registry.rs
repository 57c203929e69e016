// SPDX-License-Identifier: Apache-2.0
//! Pattern-to-type registry.
//!
//! Maps glob-style path patterns to storable types so the store knows which
//! type should deserialize a given path. Registrations are an ordered list:
//! resolution scans in insertion order and the FIRST matching pattern wins.
//! Re-registering a pattern does not replace the earlier entry — callers are
//! expected to register specific patterns before general ones.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use trellis_types::{ObjectPath, PathPattern};

use crate::model::{Persistent, PersistentType, TypeDescriptor};

fn construct_blank<T: PersistentType>() -> Arc<dyn Persistent> {
    Arc::new(T::blank())
}

/// One (pattern, type) registration.
#[derive(Clone)]
pub struct TypeRegistration {
    pattern: PathPattern,
    descriptor: &'static TypeDescriptor,
    construct: fn() -> Arc<dyn Persistent>,
}

impl TypeRegistration {
    /// The registered pattern.
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// The registered type's descriptor.
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    /// Construct a blank instance of the registered type.
    pub(crate) fn instantiate(&self) -> Arc<dyn Persistent> {
        (self.construct)()
    }
}

impl fmt::Debug for TypeRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistration")
            .field("pattern", &self.pattern.as_str())
            .field("type", &self.descriptor.name)
            .finish()
    }
}

/// Ordered list of pattern-to-type registrations.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    registrations: Vec<TypeRegistration>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration for `T` at `pattern`.
    ///
    /// Earlier registrations keep priority over later ones.
    pub fn register<T: PersistentType>(&mut self, pattern: PathPattern) {
        debug!(
            pattern = pattern.as_str(),
            type_name = T::type_descriptor().name,
            "registered type"
        );
        self.registrations.push(TypeRegistration {
            pattern,
            descriptor: T::type_descriptor(),
            construct: construct_blank::<T>,
        });
    }

    /// Resolve the type for a path: the first registration (in insertion
    /// order) whose pattern matches.
    pub fn resolve(&self, path: &ObjectPath) -> Option<&TypeRegistration> {
        self.registrations.iter().find(|r| r.pattern.matches(path))
    }

    /// The pattern first registered for a type, if any.
    pub fn pattern_for(&self, descriptor: &'static TypeDescriptor) -> Option<&PathPattern> {
        self.registrations
            .iter()
            .find(|r| std::ptr::eq(r.descriptor, descriptor))
            .map(|r| &r.pattern)
    }

    /// Drop all registrations.
    pub fn clear(&mut self) {
        self.registrations.clear();
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
