//! On-disk fleet snapshot format and its per-scope index.

use crate::SnapshotError;
use fleetlic_model::{
    AttributeSnapshot, AttributeValue, EquipmentInstance, EquipmentType, MetricDefinition,
    ProductData, TypeForest, UserRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// A whole fleet: one [`ScopeData`] per scope name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub scopes: BTreeMap<String, ScopeData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeData {
    #[serde(default)]
    pub equipment_types: Vec<EquipmentType>,
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,
    #[serde(default)]
    pub equipment: Vec<EquipmentRecord>,
    #[serde(default)]
    pub products: Vec<ProductRecord>,
}

/// A stored equipment instance with its current attribute values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub equip_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl EquipmentRecord {
    pub fn new(id: impl Into<String>, equip_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            equip_type: equip_type.into(),
            parent_id: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_value(mut self, attr_id: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(attr_id.into(), value);
        self
    }

    pub fn instance(&self) -> EquipmentInstance {
        EquipmentInstance::new(&self.id, &self.equip_type, self.parent_id.clone())
    }

    pub fn values(&self) -> AttributeSnapshot {
        AttributeSnapshot::from_values(self.attributes.clone())
    }
}

/// A product, where it is installed and who uses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub tag: String,
    /// Metric names the product is licensed under; empty means any.
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

impl ProductRecord {
    pub fn data(&self) -> ProductData {
        ProductData::new(&self.name, &self.tag)
    }

    pub fn licensed_under(&self, metric: &str) -> bool {
        self.metrics.is_empty() || self.metrics.iter().any(|m| m == metric)
    }
}

impl FleetSnapshot {
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// Index
// ============================================================================

/// Lookup structures for one scope, built once per load.
#[derive(Debug)]
pub(crate) struct ScopeIndex {
    pub(crate) data: ScopeData,
    by_id: HashMap<String, usize>,
    children: HashMap<String, Vec<usize>>,
}

impl ScopeIndex {
    pub(crate) fn build(
        scope: &str,
        data: ScopeData,
        strict_schema: bool,
    ) -> Result<Self, SnapshotError> {
        let forest = TypeForest::new(data.equipment_types.clone()).map_err(|source| {
            SnapshotError::Types {
                scope: scope.to_string(),
                source,
            }
        })?;
        for ty in forest.types() {
            if let Err(source) = ty.validate_schema() {
                if strict_schema {
                    return Err(SnapshotError::Schema {
                        scope: scope.to_string(),
                        source,
                    });
                }
                tracing::warn!(scope, equip_type = %ty.type_name, error = %source, "schema check failed");
            }
        }

        let mut by_id = HashMap::with_capacity(data.equipment.len());
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        for (slot, record) in data.equipment.iter().enumerate() {
            if forest.by_name(&record.equip_type).is_none() {
                return Err(SnapshotError::UnknownType {
                    scope: scope.to_string(),
                    equip_id: record.id.clone(),
                    equip_type: record.equip_type.clone(),
                });
            }
            if by_id.insert(record.id.clone(), slot).is_some() {
                return Err(SnapshotError::DuplicateEquipment {
                    scope: scope.to_string(),
                    equip_id: record.id.clone(),
                });
            }
            if let Some(parent) = &record.parent_id {
                children.entry(parent.clone()).or_default().push(slot);
            }
        }

        Ok(Self {
            data,
            by_id,
            children,
        })
    }

    pub(crate) fn get(&self, equip_id: &str) -> Option<&EquipmentRecord> {
        self.by_id.get(equip_id).map(|&slot| &self.data.equipment[slot])
    }

    pub(crate) fn find(&self, equip_id: &str, equip_type: &str) -> Option<&EquipmentRecord> {
        self.get(equip_id).filter(|r| r.equip_type == equip_type)
    }

    /// Anchor plus every descendant at most `depth` levels below it.
    pub(crate) fn subtree(&self, anchor: &str, depth: Option<u8>) -> Vec<&EquipmentRecord> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        if let Some(root) = self.get(anchor) {
            queue.push_back((root, 0u8));
        }
        while let Some((record, level)) = queue.pop_front() {
            if !seen.insert(record.id.as_str()) {
                continue;
            }
            out.push(record);
            if depth.is_some_and(|d| level >= d) {
                continue;
            }
            for &slot in self.children.get(&record.id).into_iter().flatten() {
                queue.push_back((&self.data.equipment[slot], level.saturating_add(1)));
            }
        }
        out
    }

    /// Walk `steps` parent links up from `equip_id`.
    pub(crate) fn ancestor(&self, equip_id: &str, steps: usize) -> Option<&EquipmentRecord> {
        let mut current = self.get(equip_id)?;
        for _ in 0..steps {
            current = self.get(current.parent_id.as_deref()?)?;
        }
        Some(current)
    }
}
