//! Feature catalog tables
//!
//! In-memory result of a catalog scan: the flat table of global value index
//! to display string, the reverse lookup from `(feature, string)` back to the
//! global index, and one slot per known feature with its values in scan
//! order and the current selection.

use crate::types::{FEATURES, FeatureId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Reverse lookup key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueKey {
    pub feature: FeatureId,
    pub value: String,
}

impl ValueKey {
    pub fn new(feature: FeatureId, value: impl Into<String>) -> Self {
        Self {
            feature,
            value: value.into(),
        }
    }
}

/// Values and current selection of one feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureSlot {
    /// Display strings in catalog-scan order
    pub values: Vec<String>,
    /// Currently selected display string
    pub selected: Option<String>,
}

impl FeatureSlot {
    /// Position of the current selection within `values`
    pub fn selected_position(&self) -> Option<usize> {
        let selected = self.selected.as_deref()?;
        self.values.iter().position(|v| v == selected)
    }

    /// Stored value matching `value` case-insensitively
    pub fn find_value(&self, value: &str) -> Option<&str> {
        let wanted = value.to_uppercase();
        self.values
            .iter()
            .find(|v| v.to_uppercase() == wanted)
            .map(String::as_str)
    }
}

/// Lookup tables and feature slots of one catalog generation
#[derive(Debug, Clone)]
pub struct FeatureCatalog {
    values: BTreeMap<u16, String>,
    lookup: HashMap<ValueKey, u16>,
    slots: BTreeMap<FeatureId, FeatureSlot>,
}

impl Default for FeatureCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureCatalog {
    /// Empty catalog with a slot for every feature in the compiled-in table
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
            lookup: HashMap::new(),
            slots: FEATURES
                .iter()
                .map(|descriptor| (descriptor.id, FeatureSlot::default()))
                .collect(),
        }
    }

    /// Drop every discovered value and selection, keeping empty slots
    pub fn clear(&mut self) {
        self.values.clear();
        self.lookup.clear();
        for slot in self.slots.values_mut() {
            *slot = FeatureSlot::default();
        }
    }

    /// Whether a slot exists for the feature
    pub fn has_slot(&self, feature: FeatureId) -> bool {
        self.slots.contains_key(&feature)
    }

    /// Record one discovered value
    ///
    /// Returns false and records nothing if the feature has no slot. A
    /// duplicate display string for the same feature overwrites the reverse
    /// lookup, so the last index wins.
    pub fn insert(&mut self, feature: FeatureId, index: u16, value: String) -> bool {
        let Some(slot) = self.slots.get_mut(&feature) else {
            return false;
        };

        slot.values.push(value.clone());
        self.lookup.insert(ValueKey::new(feature, value.clone()), index);
        self.values.insert(index, value);
        true
    }

    /// Display string at a global value index
    pub fn value(&self, index: u16) -> Option<&str> {
        self.values.get(&index).map(String::as_str)
    }

    /// Global value index for a feature's display string
    pub fn index_of(&self, feature: FeatureId, value: &str) -> Option<u16> {
        self.lookup.get(&ValueKey::new(feature, value)).copied()
    }

    /// Number of recorded values across all features
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn slot(&self, feature: FeatureId) -> Option<&FeatureSlot> {
        self.slots.get(&feature)
    }

    /// Slots in feature id order
    pub fn slots(&self) -> impl Iterator<Item = (FeatureId, &FeatureSlot)> {
        self.slots.iter().map(|(id, slot)| (*id, slot))
    }

    /// Set a feature's selection to a value it owns
    ///
    /// Returns false and leaves the selection untouched if the feature has
    /// no slot or the value is not one of its strings.
    pub fn select(&mut self, feature: FeatureId, value: &str) -> bool {
        match self.slots.get_mut(&feature) {
            Some(slot) if slot.values.iter().any(|v| v == value) => {
                slot.selected = Some(value.to_string());
                true
            }
            _ => false,
        }
    }
}
