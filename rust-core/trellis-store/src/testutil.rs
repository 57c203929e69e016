// SPDX-License-Identifier: Apache-2.0
//! Minimal storable types for unit tests.
//!
//! These stand in for the reactive domain model: persisted fields hold
//! whatever was set, derived fields recompute from persisted state on every
//! access.

use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};

use trellis_types::Value;

use crate::model::{
    FieldDescriptor, FieldError, FieldKind, FieldRole, Persistent, PersistentType, StoreBinding,
    TypeDescriptor,
};

fn read(cell: &RwLock<Value>) -> Value {
    cell.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write(cell: &RwLock<Value>, value: Value) {
    *cell.write().unwrap_or_else(PoisonError::into_inner) = value;
}

static QUOTE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "Symbol",
        kind: FieldKind::Text,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "Bid",
        kind: FieldKind::Float,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "Ask",
        kind: FieldKind::Float,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "Stamp",
        kind: FieldKind::Timestamp,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "Mid",
        kind: FieldKind::Float,
        role: FieldRole::Derived,
    },
];

static QUOTE_DESCRIPTOR: TypeDescriptor = TypeDescriptor {
    name: "Quote",
    fields: QUOTE_FIELDS,
};

/// A two-sided market quote; `Mid` derives from `Bid`/`Ask`.
pub(crate) struct Quote {
    symbol: RwLock<Value>,
    bid: RwLock<Value>,
    ask: RwLock<Value>,
    stamp: RwLock<Value>,
    binding: StoreBinding,
}

impl Quote {
    pub fn set_symbol(&self, symbol: &str) {
        write(&self.symbol, Value::from(symbol));
    }

    pub fn set_bid(&self, bid: f64) {
        write(&self.bid, Value::Float(bid));
    }

    pub fn set_ask(&self, ask: f64) {
        write(&self.ask, Value::Float(ask));
    }

    pub fn bid(&self) -> f64 {
        read(&self.bid).as_f64().unwrap_or_default()
    }

    pub fn mid(&self) -> f64 {
        (self.bid() + read(&self.ask).as_f64().unwrap_or_default()) / 2.0
    }
}

impl Persistent for Quote {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &QUOTE_DESCRIPTOR
    }

    fn get_field(&self, name: &str) -> Result<Value, FieldError> {
        match name {
            "Symbol" => Ok(read(&self.symbol)),
            "Bid" => Ok(read(&self.bid)),
            "Ask" => Ok(read(&self.ask)),
            "Stamp" => Ok(read(&self.stamp)),
            "Mid" => Ok(Value::Float(self.mid())),
            other => Err(FieldError::UnknownField {
                type_name: QUOTE_DESCRIPTOR.name,
                field: other.to_string(),
            }),
        }
    }

    fn set_field(&self, name: &str, value: Value) -> Result<(), FieldError> {
        let cell = match name {
            "Symbol" => &self.symbol,
            "Bid" => &self.bid,
            "Ask" => &self.ask,
            "Stamp" => &self.stamp,
            other => {
                return Err(FieldError::UnknownField {
                    type_name: QUOTE_DESCRIPTOR.name,
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

impl PersistentType for Quote {
    fn type_descriptor() -> &'static TypeDescriptor {
        &QUOTE_DESCRIPTOR
    }

    fn blank() -> Self {
        Self {
            symbol: RwLock::new(Value::Text(String::new())),
            bid: RwLock::new(Value::Float(0.0)),
            ask: RwLock::new(Value::Float(0.0)),
            stamp: RwLock::new(Value::Null),
            binding: StoreBinding::new(),
        }
    }
}

static HOLDING_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "Symbol",
        kind: FieldKind::Text,
        role: FieldRole::Persisted,
    },
    FieldDescriptor {
        name: "Quantity",
        kind: FieldKind::Int,
        role: FieldRole::Persisted,
    },
];

static HOLDING_DESCRIPTOR: TypeDescriptor = TypeDescriptor {
    name: "Holding",
    fields: HOLDING_FIELDS,
};

/// A plain position row; used where a second distinct type is needed.
pub(crate) struct Holding {
    symbol: RwLock<Value>,
    quantity: RwLock<Value>,
    binding: StoreBinding,
}

impl Holding {
    pub fn set_quantity(&self, quantity: i64) {
        write(&self.quantity, Value::Int(quantity));
    }

    pub fn quantity(&self) -> i64 {
        read(&self.quantity).as_i64().unwrap_or_default()
    }
}

impl Persistent for Holding {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &HOLDING_DESCRIPTOR
    }

    fn get_field(&self, name: &str) -> Result<Value, FieldError> {
        match name {
            "Symbol" => Ok(read(&self.symbol)),
            "Quantity" => Ok(read(&self.quantity)),
            other => Err(FieldError::UnknownField {
                type_name: HOLDING_DESCRIPTOR.name,
                field: other.to_string(),
            }),
        }
    }

    fn set_field(&self, name: &str, value: Value) -> Result<(), FieldError> {
        match name {
            "Symbol" => write(&self.symbol, value),
            "Quantity" => write(&self.quantity, value),
            other => {
                return Err(FieldError::UnknownField {
                    type_name: HOLDING_DESCRIPTOR.name,
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

impl PersistentType for Holding {
    fn type_descriptor() -> &'static TypeDescriptor {
        &HOLDING_DESCRIPTOR
    }

    fn blank() -> Self {
        Self {
            symbol: RwLock::new(Value::Text(String::new())),
            quantity: RwLock::new(Value::Int(0)),
            binding: StoreBinding::new(),
        }
    }
}

static BAD_TICK_FIELDS: &[FieldDescriptor] = &[FieldDescriptor {
    name: "Payload",
    kind: FieldKind::Map,
    role: FieldRole::Persisted,
}];

static BAD_TICK_DESCRIPTOR: TypeDescriptor = TypeDescriptor {
    name: "BadTick",
    fields: BAD_TICK_FIELDS,
};

/// A type whose `Payload` field can be forced to hold arbitrary values,
/// including ones the serializer must reject.
pub(crate) struct BadTick {
    payload: RwLock<Value>,
    binding: StoreBinding,
}

impl BadTick {
    pub fn set_payload(&self, value: Value) {
        write(&self.payload, value);
    }
}

impl Persistent for BadTick {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &BAD_TICK_DESCRIPTOR
    }

    fn get_field(&self, name: &str) -> Result<Value, FieldError> {
        match name {
            "Payload" => Ok(read(&self.payload)),
            other => Err(FieldError::UnknownField {
                type_name: BAD_TICK_DESCRIPTOR.name,
                field: other.to_string(),
            }),
        }
    }

    fn set_field(&self, name: &str, value: Value) -> Result<(), FieldError> {
        match name {
            "Payload" => {
                write(&self.payload, value);
                Ok(())
            }
            other => Err(FieldError::UnknownField {
                type_name: BAD_TICK_DESCRIPTOR.name,
                field: other.to_string(),
            }),
        }
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

impl PersistentType for BadTick {
    fn type_descriptor() -> &'static TypeDescriptor {
        &BAD_TICK_DESCRIPTOR
    }

    fn blank() -> Self {
        Self {
            payload: RwLock::new(Value::Null),
            binding: StoreBinding::new(),
        }
    }
}
