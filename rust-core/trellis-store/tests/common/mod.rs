// SPDX-License-Identifier: Apache-2.0
//! Shared storable fixtures for the integration suites.
//!
//! These types stand in for the reactive domain model the store is built to
//! persist: persisted fields hold set values, derived fields recompute from
//! persisted state (plus in-memory defaults) on every access and are never
//! serialized.

#![allow(dead_code)]

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use trellis_store::{
    FieldDescriptor, FieldError, FieldKind, FieldRole, ObjectPath, PathPattern, Persistent,
    PersistentType, StoreBinding, TypeDescriptor, Value,
};

pub fn path(s: &str) -> ObjectPath {
    ObjectPath::parse(s).unwrap()
}

pub fn pattern(s: &str) -> PathPattern {
    PathPattern::parse(s).unwrap()
}

fn read(cell: &RwLock<Value>) -> Value {
    cell.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write(cell: &RwLock<Value>, value: Value) {
    *cell.write().unwrap_or_else(PoisonError::into_inner) = value;
}

// ---------------------------------------------------------------------------
// VanillaOption
// ---------------------------------------------------------------------------

static VANILLA_OPTION_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "Strike",
        kind: FieldKind::Float,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "TimeToExpiry",
        kind: FieldKind::Float,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "IsCall",
        kind: FieldKind::Bool,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "Expiry",
        kind: FieldKind::Timestamp,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "Spot",
        kind: FieldKind::Float,
        role: FieldRole::Derived,
    },
    FieldDescriptor {
        name: "Volatility",
        kind: FieldKind::Float,
        role: FieldRole::Derived,
    },
    FieldDescriptor {
        name: "Price",
        kind: FieldKind::Float,
        role: FieldRole::Derived,
    },
];

static VANILLA_OPTION_DESCRIPTOR: TypeDescriptor = TypeDescriptor {
    name: "VanillaOption",
    fields: VANILLA_OPTION_FIELDS,
};

/// A vanilla equity option. `Strike`, `TimeToExpiry`, `IsCall`, and `Expiry`
/// persist; `Spot` and `Volatility` are in-memory market state with
/// defaults, and `Price` recomputes from the rest on every access.
pub struct VanillaOption {
    strike: RwLock<Value>,
    time_to_expiry: RwLock<Value>,
    is_call: RwLock<Value>,
    expiry: RwLock<Value>,
    spot: RwLock<Value>,
    volatility: RwLock<Value>,
    binding: StoreBinding,
}

impl VanillaOption {
    pub fn strike(&self) -> f64 {
        read(&self.strike).as_f64().unwrap_or_default()
    }

    pub fn set_strike(&self, strike: f64) {
        write(&self.strike, Value::Float(strike));
    }

    pub fn time_to_expiry(&self) -> f64 {
        read(&self.time_to_expiry).as_f64().unwrap_or_default()
    }

    pub fn set_time_to_expiry(&self, years: f64) {
        write(&self.time_to_expiry, Value::Float(years));
    }

    pub fn is_call(&self) -> bool {
        read(&self.is_call).as_bool().unwrap_or_default()
    }

    pub fn set_is_call(&self, is_call: bool) {
        write(&self.is_call, Value::Bool(is_call));
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        read(&self.expiry).as_timestamp()
    }

    pub fn set_expiry(&self, expiry: DateTime<Utc>) {
        write(&self.expiry, Value::Timestamp(expiry));
    }

    pub fn spot(&self) -> f64 {
        read(&self.spot).as_f64().unwrap_or_default()
    }

    pub fn set_spot(&self, spot: f64) {
        write(&self.spot, Value::Float(spot));
    }

    pub fn volatility(&self) -> f64 {
        read(&self.volatility).as_f64().unwrap_or_default()
    }

    /// Intrinsic value plus a crude time-value term; enough to show derived
    /// state recomputing from persisted inputs.
    pub fn price(&self) -> f64 {
        let intrinsic = if self.is_call() {
            (self.spot() - self.strike()).max(0.0)
        } else {
            (self.strike() - self.spot()).max(0.0)
        };
        intrinsic + self.volatility() * self.spot() * self.time_to_expiry().max(0.0).sqrt() * 0.4
    }
}

impl Persistent for VanillaOption {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &VANILLA_OPTION_DESCRIPTOR
    }

    fn get_field(&self, name: &str) -> Result<Value, FieldError> {
        match name {
            "Strike" => Ok(read(&self.strike)),
            "TimeToExpiry" => Ok(read(&self.time_to_expiry)),
            "IsCall" => Ok(read(&self.is_call)),
            "Expiry" => Ok(read(&self.expiry)),
            "Spot" => Ok(read(&self.spot)),
            "Volatility" => Ok(read(&self.volatility)),
            "Price" => Ok(Value::Float(self.price())),
            other => Err(FieldError::UnknownField {
                type_name: VANILLA_OPTION_DESCRIPTOR.name,
                field: other.to_string(),
            }),
        }
    }

    fn set_field(&self, name: &str, value: Value) -> Result<(), FieldError> {
        let cell = match name {
            "Strike" => &self.strike,
            "TimeToExpiry" => &self.time_to_expiry,
            "IsCall" => &self.is_call,
            "Expiry" => &self.expiry,
            "Spot" => &self.spot,
            "Volatility" => &self.volatility,
            other => {
                return Err(FieldError::UnknownField {
                    type_name: VANILLA_OPTION_DESCRIPTOR.name,
                    field: other.to_string(),
                })
            }
        };
        write(cell, value);
        Ok(())
    }

    fn binding(&self) -> &StoreBinding {
        &self.binding
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl PersistentType for VanillaOption {
    fn type_descriptor() -> &'static TypeDescriptor {
        &VANILLA_OPTION_DESCRIPTOR
    }

    fn blank() -> Self {
        Self {
            strike: RwLock::new(Value::Float(100.0)),
            time_to_expiry: RwLock::new(Value::Float(1.0)),
            is_call: RwLock::new(Value::Bool(true)),
            expiry: RwLock::new(Value::Null),
            spot: RwLock::new(Value::Float(100.0)),
            volatility: RwLock::new(Value::Float(0.20)),
            binding: StoreBinding::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

static STOCK_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "Symbol",
        kind: FieldKind::Text,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "Shares",
        kind: FieldKind::Int,
        role: FieldRole::Persisted,
    },
];

static STOCK_DESCRIPTOR: TypeDescriptor = TypeDescriptor {
    name: "Stock",
    fields: STOCK_FIELDS,
};

pub struct Stock {
    symbol: RwLock<Value>,
    shares: RwLock<Value>,
    binding: StoreBinding,
}

impl Stock {
    pub fn symbol(&self) -> String {
        read(&self.symbol).as_str().unwrap_or_default().to_string()
    }

    pub fn set_symbol(&self, symbol: &str) {
        write(&self.symbol, Value::from(symbol));
    }

    pub fn shares(&self) -> i64 {
        read(&self.shares).as_i64().unwrap_or_default()
    }

    pub fn set_shares(&self, shares: i64) {
        write(&self.shares, Value::Int(shares));
    }
}

impl Persistent for Stock {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &STOCK_DESCRIPTOR
    }

    fn get_field(&self, name: &str) -> Result<Value, FieldError> {
        match name {
            "Symbol" => Ok(read(&self.symbol)),
            "Shares" => Ok(read(&self.shares)),
            other => Err(FieldError::UnknownField {
                type_name: STOCK_DESCRIPTOR.name,
                field: other.to_string(),
            }),
        }
    }

    fn set_field(&self, name: &str, value: Value) -> Result<(), FieldError> {
        match name {
            "Symbol" => write(&self.symbol, value),
            "Shares" => write(&self.shares, value),
            other => {
                return Err(FieldError::UnknownField {
                    type_name: STOCK_DESCRIPTOR.name,
                    field: other.to_string(),
                })
            }
        }
        Ok(())
    }

    fn binding(&self) -> &StoreBinding {
        &self.binding
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl PersistentType for Stock {
    fn type_descriptor() -> &'static TypeDescriptor {
        &STOCK_DESCRIPTOR
    }

    fn blank() -> Self {
        Self {
            symbol: RwLock::new(Value::Text(String::new())),
            shares: RwLock::new(Value::Int(0)),
            binding: StoreBinding::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

static BOOK_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "Name",
        kind: FieldKind::Text,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "Tags",
        kind: FieldKind::List,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "Limits",
        kind: FieldKind::Map,
        role: FieldRole::Persisted,
    },
];

static BOOK_DESCRIPTOR: TypeDescriptor = TypeDescriptor {
    name: "Book",
    fields: BOOK_FIELDS,
};

/// A trading book carrying composite persisted state.
pub struct Book {
    name: RwLock<Value>,
    tags: RwLock<Value>,
    limits: RwLock<Value>,
    binding: StoreBinding,
}

impl Book {
    pub fn set_name(&self, name: &str) {
        write(&self.name, Value::from(name));
    }

    pub fn name(&self) -> String {
        read(&self.name).as_str().unwrap_or_default().to_string()
    }

    pub fn set_tags(&self, tags: &[&str]) {
        write(
            &self.tags,
            Value::List(tags.iter().map(|t| Value::from(*t)).collect()),
        );
    }

    pub fn tags(&self) -> Vec<String> {
        read(&self.tags)
            .as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_limit(&self, key: &str, value: f64) {
        let mut limits = read(&self.limits).as_map().cloned().unwrap_or_default();
        limits.insert(key.to_string(), Value::Float(value));
        write(&self.limits, Value::Map(limits));
    }

    pub fn limit(&self, key: &str) -> Option<f64> {
        read(&self.limits)
            .as_map()
            .and_then(|m| m.get(key).and_then(Value::as_f64))
    }
}

impl Persistent for Book {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &BOOK_DESCRIPTOR
    }

    fn get_field(&self, name: &str) -> Result<Value, FieldError> {
        match name {
            "Name" => Ok(read(&self.name)),
            "Tags" => Ok(read(&self.tags)),
            "Limits" => Ok(read(&self.limits)),
            other => Err(FieldError::UnknownField {
                type_name: BOOK_DESCRIPTOR.name,
                field: other.to_string(),
            }),
        }
    }

    fn set_field(&self, name: &str, value: Value) -> Result<(), FieldError> {
        match name {
            "Name" => write(&self.name, value),
            "Tags" => write(&self.tags, value),
            "Limits" => write(&self.limits, value),
            other => {
                return Err(FieldError::UnknownField {
                    type_name: BOOK_DESCRIPTOR.name,
                    field: other.to_string(),
                })
            }
        }
        Ok(())
    }

    fn binding(&self) -> &StoreBinding {
        &self.binding
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl PersistentType for Book {
    fn type_descriptor() -> &'static TypeDescriptor {
        &BOOK_DESCRIPTOR
    }

    fn blank() -> Self {
        Self {
            name: RwLock::new(Value::Text(String::new())),
            tags: RwLock::new(Value::List(Vec::new())),
            limits: RwLock::new(Value::Map(BTreeMap::new())),
            binding: StoreBinding::new(),
        }
    }
}
