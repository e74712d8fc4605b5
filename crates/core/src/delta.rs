//! Delta operations for accumulator-style values
//!
//! A [`Delta`] is a partial update that can be merged into a value without
//! knowing the rest of it: bump a counter, set or drop one field of an
//! object, append to a list. Transactions queue deltas in a [`DeltaLog`] and
//! fold them over the stored value at commit, so concurrent partial updates
//! to the same key commute instead of overwriting each other.
//!
//! Merging into an absent (or `Null`) base starts from the empty value of the
//! delta's shape: `0`, `{}` or `[]`.

use crate::error::{Error, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

/// A single mergeable change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Delta {
    /// Add to an `Int` counter (saturating)
    Add(i64),
    /// Set one field of an `Object`
    PutField {
        /// Field name
        field: String,
        /// New field value
        value: Value,
    },
    /// Remove one field of an `Object`
    RemoveField(String),
    /// Append to an `Array`
    Append(Value),
}

impl Delta {
    /// Type name of the value this delta applies to
    pub fn target_type(&self) -> &'static str {
        match self {
            Delta::Add(_) => "Int",
            Delta::PutField { .. } | Delta::RemoveField(_) => "Object",
            Delta::Append(_) => "Array",
        }
    }

    fn empty_base(&self) -> Value {
        match self {
            Delta::Add(_) => Value::Int(0),
            Delta::PutField { .. } | Delta::RemoveField(_) => Value::Object(HashMap::new()),
            Delta::Append(_) => Value::Array(Vec::new()),
        }
    }

    /// Merge this delta into `target` in place.
    ///
    /// A `Null` target is replaced by the empty value first. On error the
    /// target is left unchanged.
    pub fn apply_to(&self, target: &mut Value) -> Result<()> {
        if target.is_null() {
            *target = self.empty_base();
        }
        match (self, target) {
            (Delta::Add(n), Value::Int(current)) => {
                *current = current.saturating_add(*n);
                Ok(())
            }
            (Delta::PutField { field, value }, Value::Object(map)) => {
                map.insert(field.clone(), value.clone());
                Ok(())
            }
            (Delta::RemoveField(field), Value::Object(map)) => {
                map.remove(field);
                Ok(())
            }
            (Delta::Append(value), Value::Array(items)) => {
                items.push(value.clone());
                Ok(())
            }
            (delta, other) => Err(Error::WrongType {
                expected: delta.target_type(),
                actual: other.type_name(),
            }),
        }
    }

    /// Merge this delta into an optional base, producing the merged value.
    pub fn merge(&self, base: Option<Value>) -> Result<Value> {
        let mut value = base.unwrap_or(Value::Null);
        self.apply_to(&mut value)?;
        Ok(value)
    }
}

/// Ordered sequence of deltas queued by one transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaLog {
    deltas: SmallVec<[Delta; 4]>,
}

impl DeltaLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a delta at the end of the log
    pub fn push(&mut self, delta: Delta) {
        self.deltas.push(delta);
    }

    /// Number of queued deltas
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Drop all queued deltas
    pub fn clear(&mut self) {
        self.deltas.clear();
    }

    /// Iterate in queue order
    pub fn iter(&self) -> impl Iterator<Item = &Delta> {
        self.deltas.iter()
    }

    /// Fold every queued delta, in order, over `base`.
    ///
    /// An empty log returns `base` untouched. The fold is all-or-nothing: an
    /// incompatible delta anywhere in the log fails the whole fold.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_cache_core::delta::{Delta, DeltaLog};
    /// use strata_cache_core::value::Value;
    ///
    /// let mut log = DeltaLog::new();
    /// log.push(Delta::Add(2));
    /// log.push(Delta::Add(3));
    /// assert_eq!(log.fold(None).unwrap(), Some(Value::Int(5)));
    /// ```
    pub fn fold(&self, base: Option<Value>) -> Result<Option<Value>> {
        if self.deltas.is_empty() {
            return Ok(base);
        }
        let mut value = base.unwrap_or(Value::Null);
        for delta in &self.deltas {
            delta.apply_to(&mut value)?;
        }
        Ok(Some(value))
    }
}

impl FromIterator<Delta> for DeltaLog {
    fn from_iter<I: IntoIterator<Item = Delta>>(iter: I) -> Self {
        Self {
            deltas: iter.into_iter().collect(),
        }
    }
}
