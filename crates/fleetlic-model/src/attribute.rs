//! Equipment attributes and simulation snapshots.
//!
//! A simulation request carries a list of `AttributeOverride`s. Each override
//! holds the value observed in the store ("old") and, when the attribute is
//! simulated, a hypothetical replacement ("new"). The engine never mutates an
//! override set in place: it builds two independent `AttributeSnapshot`s and
//! runs the formulas once against each.

use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared data type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Float,
    String,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::String => write!(f, "string"),
        }
    }
}

/// A typed attribute value.
///
/// Serialized untagged so JSON numbers and strings map directly. A JSON
/// integer given for a float attribute is widened by [`AttributeValue::coerce`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn data_type(&self) -> DataType {
        match self {
            AttributeValue::Int(_) => DataType::Int,
            AttributeValue::Float(_) => DataType::Float,
            AttributeValue::String(_) => DataType::String,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::String(_) => None,
        }
    }

    /// Check this value against a declared type, widening int to float.
    pub fn coerce(self, declared: DataType) -> Result<Self, DataType> {
        match (self, declared) {
            (AttributeValue::Int(v), DataType::Float) => Ok(AttributeValue::Float(v as f64)),
            (value, declared) if value.data_type() == declared => Ok(value),
            (value, _) => Err(value.data_type()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::String(v) => write!(f, "{v}"),
        }
    }
}

/// Attribute declaration on an equipment type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: String,
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub is_identifier: bool,
    #[serde(default)]
    pub is_parent_identifier: bool,
    #[serde(default)]
    pub is_searchable: bool,
    #[serde(default)]
    pub is_displayed: bool,
}

impl Attribute {
    pub fn new(id: impl Into<String>, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data_type,
            is_identifier: false,
            is_parent_identifier: false,
            is_searchable: false,
            is_displayed: false,
        }
    }

    /// Mark as the primary key (identifier attributes are always displayed).
    pub fn identifier(mut self) -> Self {
        self.is_identifier = true;
        self.is_displayed = true;
        self
    }

    pub fn parent_identifier(mut self) -> Self {
        self.is_parent_identifier = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.is_searchable = true;
        self.is_displayed = true;
        self
    }

    pub fn displayed(mut self) -> Self {
        self.is_displayed = true;
        self
    }
}

/// One attribute of a simulation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeOverride {
    pub id: String,
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub simulated: bool,
    /// Hypothetical value; only read when `simulated` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AttributeValue>,
    /// Value currently stored for the equipment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<AttributeValue>,
}

impl AttributeOverride {
    /// A simulated attribute: `old` is replaced by `new` on the "new" side.
    pub fn simulated(
        id: impl Into<String>,
        name: impl Into<String>,
        data_type: DataType,
        new: AttributeValue,
        old: AttributeValue,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data_type,
            simulated: true,
            value: Some(new),
            old_value: Some(old),
        }
    }

    /// A non-simulated attribute: both sides see `current`.
    pub fn unchanged(
        id: impl Into<String>,
        name: impl Into<String>,
        data_type: DataType,
        current: AttributeValue,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data_type,
            simulated: false,
            value: None,
            old_value: Some(current),
        }
    }

    fn checked(&self, value: &AttributeValue) -> Result<AttributeValue, ModelError> {
        value
            .clone()
            .coerce(self.data_type)
            .map_err(|actual| ModelError::ValueTypeMismatch {
                id: self.id.clone(),
                name: self.name.clone(),
                declared: self.data_type,
                actual,
            })
    }

    /// Value seen before the simulation. Falls back to `value` when the
    /// caller only sent the current reading.
    pub fn resolved_old(&self) -> Result<Option<AttributeValue>, ModelError> {
        self.old_value
            .as_ref()
            .or(self.value.as_ref())
            .map(|v| self.checked(v))
            .transpose()
    }

    /// Value seen by the simulation. Identical to the old value unless the
    /// attribute is simulated.
    pub fn resolved_new(&self) -> Result<Option<AttributeValue>, ModelError> {
        if !self.simulated {
            return self.resolved_old();
        }
        self.value
            .as_ref()
            .or(self.old_value.as_ref())
            .map(|v| self.checked(v))
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub value: AttributeValue,
    pub simulated: bool,
}

/// Immutable attribute-id → value map for one side of a simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSnapshot {
    entries: BTreeMap<String, SnapshotEntry>,
}

impl AttributeSnapshot {
    /// Build the `(old, new)` snapshot pair from request overrides.
    ///
    /// Attributes with no value on either side are left out; formulas that
    /// need them fail with [`ModelError::MissingValue`].
    pub fn pair(overrides: &[AttributeOverride]) -> Result<(Self, Self), ModelError> {
        let mut old = BTreeMap::new();
        let mut new = BTreeMap::new();
        for attr in overrides {
            if let Some(value) = attr.resolved_old()? {
                old.insert(
                    attr.id.clone(),
                    SnapshotEntry {
                        name: attr.name.clone(),
                        value,
                        simulated: attr.simulated,
                    },
                );
            }
            if let Some(value) = attr.resolved_new()? {
                new.insert(
                    attr.id.clone(),
                    SnapshotEntry {
                        name: attr.name.clone(),
                        value,
                        simulated: attr.simulated,
                    },
                );
            }
        }
        Ok((Self { entries: old }, Self { entries: new }))
    }

    pub fn from_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        let entries = values
            .into_iter()
            .map(|(id, value)| {
                let id = id.into();
                (
                    id.clone(),
                    SnapshotEntry {
                        name: id,
                        value,
                        simulated: false,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&AttributeValue> {
        self.entries.get(id).map(|e| &e.value)
    }

    pub fn entry(&self, id: &str) -> Option<&SnapshotEntry> {
        self.entries.get(id)
    }

    /// Numeric value of attribute `attr`, as used by license formulas.
    pub fn numeric(&self, attr: &Attribute) -> Result<f64, ModelError> {
        let value = self.get(&attr.id).ok_or_else(|| ModelError::MissingValue {
            id: attr.id.clone(),
            name: attr.name.clone(),
        })?;
        value.as_f64().ok_or_else(|| ModelError::NotNumeric {
            id: attr.id.clone(),
            name: attr.name.clone(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SnapshotEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
