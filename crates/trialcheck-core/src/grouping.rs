//! Grouping of nonconformities for presentation layers.
//!
//! A flat nonconformity list is regrouped by tool group and measurement
//! number so a measurement table row can find its messages directly.
//! Global nonconformities go under `globals`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::nonconformity::Nonconformity;
use crate::types::Measurement;
use crate::ConformanceError;

/// Key the global messages are serialized under.
pub const GLOBALS_KEY: &str = "globals";

/// Lookup from tool type to the group it is displayed under.
///
/// A group may not be named [`GLOBALS_KEY`]; it would share a key with the
/// global messages once serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ToolGroupMap(BTreeMap<String, String>);

impl ToolGroupMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from `(tool type, group)` pairs.
    pub fn from_pairs<T, G>(pairs: impl IntoIterator<Item = (T, G)>) -> Result<Self, ConformanceError>
    where
        T: Into<String>,
        G: Into<String>,
    {
        let mut map = Self::new();
        for (tool_type, group) in pairs {
            map.insert(tool_type, group)?;
        }
        Ok(map)
    }

    pub fn insert(
        &mut self,
        tool_type: impl Into<String>,
        group: impl Into<String>,
    ) -> Result<(), ConformanceError> {
        let group = group.into();
        if group == GLOBALS_KEY {
            return Err(ConformanceError::ReservedGroupName(group));
        }
        self.0.insert(tool_type.into(), group);
        Ok(())
    }

    /// Group name for a tool type.
    ///
    /// Unmapped tool types are grouped under their own name so that no
    /// message is lost.
    pub fn group_name<'a>(&'a self, tool_type: &'a str) -> &'a str {
        self.0.get(tool_type).map(String::as_str).unwrap_or(tool_type)
    }
}

impl TryFrom<BTreeMap<String, String>> for ToolGroupMap {
    type Error = ConformanceError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_pairs(map)
    }
}

impl From<ToolGroupMap> for BTreeMap<String, String> {
    fn from(map: ToolGroupMap) -> Self {
        map.0
    }
}

/// Messages of global nonconformities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalGroup {
    pub messages: Vec<String>,
}

/// Messages and measurements collected for one measurement number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementNumberEntry {
    pub messages: Vec<String>,
    pub measurements: Vec<Measurement>,
}

/// Nonconformities of one tool group, keyed by measurement number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolGroup {
    pub measurement_numbers: BTreeMap<u32, MeasurementNumberEntry>,
}

/// Nonconformities keyed by `globals` or tool-group name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupedNonConformities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub globals: Option<GlobalGroup>,

    #[serde(flatten)]
    pub groups: BTreeMap<String, ToolGroup>,
}

impl GroupedNonConformities {
    pub fn is_empty(&self) -> bool {
        self.globals.is_none() && self.groups.is_empty()
    }

    pub fn global_messages(&self) -> &[String] {
        self.globals
            .as_ref()
            .map(|g| g.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn group(&self, name: &str) -> Option<&ToolGroup> {
        self.groups.get(name)
    }

    /// Entry for a measurement number within a tool group.
    pub fn entry(&self, group: &str, measurement_number: u32) -> Option<&MeasurementNumberEntry> {
        self.groups
            .get(group)
            .and_then(|g| g.measurement_numbers.get(&measurement_number))
    }

    fn push_global(&mut self, message: &str) {
        self.globals
            .get_or_insert_with(GlobalGroup::default)
            .messages
            .push(message.to_string());
    }

    /// Total number of messages across every leaf.
    pub fn message_count(&self) -> usize {
        let tool_messages: usize = self
            .groups
            .values()
            .flat_map(|g| g.measurement_numbers.values())
            .map(|e| e.messages.len())
            .sum();
        self.global_messages().len() + tool_messages
    }
}

/// Group a flat nonconformity list.
///
/// A nonconformity that references several measurements contributes its
/// message once per referenced measurement. One that references none is
/// reported with the global messages.
pub fn group_nonconformities(
    nonconformities: &[Nonconformity],
    tool_groups: &ToolGroupMap,
) -> GroupedNonConformities {
    let mut grouped = GroupedNonConformities::default();

    for nonconformity in nonconformities {
        match nonconformity {
            Nonconformity::Global { message } => grouped.push_global(message),
            Nonconformity::Measurements {
                message,
                measurements,
            } if measurements.is_empty() => grouped.push_global(message),
            Nonconformity::Measurements {
                message,
                measurements,
            } => {
                for measurement in measurements {
                    let group_name = tool_groups.group_name(&measurement.tool_type);
                    let entry = grouped
                        .groups
                        .entry(group_name.to_string())
                        .or_default()
                        .measurement_numbers
                        .entry(measurement.measurement_number)
                        .or_default();

                    entry.messages.push(message.clone());
                    entry.measurements.push(measurement.clone());
                }
            }
        }
    }

    grouped
}
