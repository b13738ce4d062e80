//! Equipment types and the type forest.
//!
//! Types are kept in an arena (`Vec<EquipmentType>`) addressed by [`TypeIdx`].
//! Parent links are arena indices, so ancestor walks and distance queries are
//! plain index chasing over a forest that is rebuilt for every request.

use crate::attribute::{Attribute, DataType};
use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentType {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl EquipmentType {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            parent_id: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn attribute(&self, id: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    pub fn attribute_by_name(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Check the attribute role rules an equipment type must satisfy.
    pub fn validate_schema(&self) -> Result<(), ModelError> {
        let invalid = |reason: String| ModelError::InvalidSchema {
            equip_type: self.type_name.clone(),
            reason,
        };

        let mut names = HashSet::new();
        for attr in &self.attributes {
            if !names.insert(attr.name.as_str()) {
                return Err(invalid(format!("attribute name {} is used twice", attr.name)));
            }
            if attr.is_identifier && attr.is_parent_identifier {
                return Err(invalid(format!(
                    "attribute {} cannot be both identifier and parent identifier",
                    attr.name
                )));
            }
            if attr.is_identifier {
                if attr.data_type != DataType::String {
                    return Err(invalid(format!("identifier {} must be a string", attr.name)));
                }
                if !attr.is_displayed {
                    return Err(invalid(format!("identifier {} must be displayed", attr.name)));
                }
            }
            if attr.is_parent_identifier && attr.data_type != DataType::String {
                return Err(invalid(format!(
                    "parent identifier {} must be a string",
                    attr.name
                )));
            }
            if attr.is_searchable && !attr.is_displayed {
                return Err(invalid(format!(
                    "searchable attribute {} must be displayed",
                    attr.name
                )));
            }
        }

        let identifiers = self.attributes.iter().filter(|a| a.is_identifier).count();
        if identifiers != 1 {
            return Err(invalid(format!(
                "expected exactly one identifier attribute, found {identifiers}"
            )));
        }

        let parent_keys = self
            .attributes
            .iter()
            .filter(|a| a.is_parent_identifier)
            .count();
        if parent_keys > 1 {
            return Err(invalid(format!(
                "at most one parent identifier is allowed, found {parent_keys}"
            )));
        }
        if parent_keys == 1 && self.parent_id.is_none() {
            return Err(invalid(
                "parent identifier given but the type has no parent".to_string(),
            ));
        }
        Ok(())
    }
}

/// Index of a type inside a [`TypeForest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdx(u32);

impl TypeIdx {
    pub const fn raw(self) -> u32 {
        self.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

/// Equipment types of one scope, as a forest.
#[derive(Debug, Clone)]
pub struct TypeForest {
    types: Vec<EquipmentType>,
    parents: Vec<Option<TypeIdx>>,
    by_id: HashMap<String, TypeIdx>,
    by_name: HashMap<String, TypeIdx>,
}

impl TypeForest {
    /// Build the arena, rejecting duplicate ids/names, dangling parents and cycles.
    pub fn new(types: Vec<EquipmentType>) -> Result<Self, ModelError> {
        let mut by_id = HashMap::with_capacity(types.len());
        let mut by_name = HashMap::with_capacity(types.len());
        for (slot, ty) in types.iter().enumerate() {
            let idx = TypeIdx(slot as u32);
            if by_id.insert(ty.id.clone(), idx).is_some() {
                return Err(ModelError::DuplicateTypeId(ty.id.clone()));
            }
            if by_name.insert(ty.type_name.clone(), idx).is_some() {
                return Err(ModelError::DuplicateTypeName(ty.type_name.clone()));
            }
        }

        let mut parents = Vec::with_capacity(types.len());
        for ty in &types {
            let parent = match &ty.parent_id {
                None => None,
                Some(pid) if pid.is_empty() => None,
                Some(pid) => Some(*by_id.get(pid).ok_or_else(|| ModelError::UnknownParent {
                    child: ty.type_name.clone(),
                    parent: pid.clone(),
                })?),
            };
            parents.push(parent);
        }

        // A walk longer than the number of types can only mean a cycle.
        for (slot, ty) in types.iter().enumerate() {
            let mut cursor = parents[slot];
            let mut steps = 0usize;
            while let Some(p) = cursor {
                steps += 1;
                if steps > types.len() {
                    return Err(ModelError::Cycle(ty.type_name.clone()));
                }
                cursor = parents[p.slot()];
            }
        }

        Ok(Self {
            types,
            parents,
            by_id,
            by_name,
        })
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, idx: TypeIdx) -> &EquipmentType {
        &self.types[idx.slot()]
    }

    pub fn idx_by_id(&self, id: &str) -> Option<TypeIdx> {
        self.by_id.get(id).copied()
    }

    pub fn idx_by_name(&self, name: &str) -> Option<TypeIdx> {
        self.by_name.get(name).copied()
    }

    pub fn by_id(&self, id: &str) -> Option<&EquipmentType> {
        self.idx_by_id(id).map(|i| self.get(i))
    }

    pub fn by_name(&self, name: &str) -> Option<&EquipmentType> {
        self.idx_by_name(name).map(|i| self.get(i))
    }

    pub fn parent_of(&self, idx: TypeIdx) -> Option<TypeIdx> {
        self.parents[idx.slot()]
    }

    /// `idx` itself, then each parent up to the root.
    pub fn ancestors(&self, idx: TypeIdx) -> Ancestors<'_> {
        Ancestors {
            forest: self,
            next: Some(idx),
        }
    }

    /// Parent steps from `from` up to `to`; `None` unless `to` is an
    /// ancestor-or-self of `from`.
    pub fn distance(&self, from: TypeIdx, to: TypeIdx) -> Option<usize> {
        self.ancestors(from).position(|i| i == to)
    }

    pub fn is_ancestor_or_self(&self, ancestor: TypeIdx, of: TypeIdx) -> bool {
        self.distance(of, ancestor).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeIdx, &EquipmentType)> {
        self.types
            .iter()
            .enumerate()
            .map(|(slot, ty)| (TypeIdx(slot as u32), ty))
    }

    pub fn types(&self) -> &[EquipmentType] {
        &self.types
    }
}

pub struct Ancestors<'a> {
    forest: &'a TypeForest,
    next: Option<TypeIdx>,
}

impl Iterator for Ancestors<'_> {
    type Item = TypeIdx;

    fn next(&mut self) -> Option<TypeIdx> {
        let current = self.next?;
        self.next = self.forest.parent_of(current);
        Some(current)
    }
}

/// One live equipment instance, as returned by a hierarchy lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub equip_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl EquipmentInstance {
    pub fn new(
        id: impl Into<String>,
        equip_type: impl Into<String>,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            equip_type: equip_type.into(),
            parent_id,
        }
    }
}
