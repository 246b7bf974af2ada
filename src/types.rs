use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Core types for the lineage graph subsystem

/// Opaque, stable identifier of a provenance node
pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineageDirection {
    Parent,
    Children,
}

impl LineageDirection {
    pub fn both() -> [LineageDirection; 2] {
        [LineageDirection::Parent, LineageDirection::Children]
    }
}

impl Default for LineageDirection {
    fn default() -> Self {
        LineageDirection::Children
    }
}

/// Directed link to another node. The role only takes part in merge dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    #[serde(alias = "lsid")]
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Edge {
    pub fn new(target: impl Into<NodeId>) -> Self {
        Self {
            target: target.into(),
            role: None,
        }
    }

    pub fn with_role(target: impl Into<NodeId>, role: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            role: Some(role.into()),
        }
    }
}

/// Display attributes filled in by the metadata enrichment fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub display_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub cpas_type: Option<String>,
    #[serde(default)]
    pub meta: Option<NodeMetadata>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub parents: Vec<Edge>,
    #[serde(default)]
    pub children: Vec<Edge>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            node_type: node_type.into(),
            cpas_type: None,
            meta: None,
            properties: Map::new(),
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_parent(mut self, target: impl Into<NodeId>) -> Self {
        self.parents.push(Edge::new(target));
        self
    }

    pub fn with_child(mut self, target: impl Into<NodeId>) -> Self {
        self.children.push(Edge::new(target));
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn edges(&self, direction: LineageDirection) -> &[Edge] {
        match direction {
            LineageDirection::Parent => &self.parents,
            LineageDirection::Children => &self.children,
        }
    }

    pub fn edges_mut(&mut self, direction: LineageDirection) -> &mut Vec<Edge> {
        match direction {
            LineageDirection::Parent => &mut self.parents,
            LineageDirection::Children => &mut self.children,
        }
    }

    /// Name shown to users, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn icon(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.icon.as_deref())
    }

    /// Resolve a filterable attribute by name. Known attributes win over
    /// free-form properties of the same name.
    pub fn field(&self, field: &str) -> Option<Value> {
        match field {
            "id" | "lsid" => Some(Value::String(self.id.clone())),
            "name" => self.name.clone().map(Value::String),
            "type" => Some(Value::String(self.node_type.clone())),
            "cpasType" => self.cpas_type.clone().map(Value::String),
            "description" => self
                .meta
                .as_ref()
                .and_then(|m| m.description.clone())
                .map(Value::String),
            "icon" => self.icon().map(|icon| Value::String(icon.to_string())),
            "displayType" => self
                .meta
                .as_ref()
                .and_then(|m| m.display_type.clone())
                .map(Value::String),
            _ => self.properties.get(field).cloned(),
        }
    }
}

/// Predicate value for field filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<Value>", into = "Option<Value>")]
pub enum FilterValue {
    /// Field presence test
    Any,
    Equals(Value),
    OneOf(Vec<Value>),
}

impl FilterValue {
    pub fn matches(&self, found: Option<&Value>) -> bool {
        match (self, found) {
            (_, None) | (_, Some(Value::Null)) => false,
            (FilterValue::Any, Some(_)) => true,
            (FilterValue::Equals(expected), Some(value)) => expected == value,
            (FilterValue::OneOf(values), Some(value)) => values.contains(value),
        }
    }
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::Any
    }
}

impl From<Option<Value>> for FilterValue {
    fn from(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => FilterValue::Any,
            Some(Value::Array(values)) => FilterValue::OneOf(values),
            Some(value) => FilterValue::Equals(value),
        }
    }
}

impl From<FilterValue> for Option<Value> {
    fn from(value: FilterValue) -> Self {
        match value {
            FilterValue::Any => None,
            FilterValue::Equals(value) => Some(value),
            FilterValue::OneOf(values) => Some(Value::Array(values)),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Equals(Value::String(value.to_string()))
    }
}

/// One field filter applied by `Lineage::filter_result`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageFilter {
    pub field: String,
    #[serde(default)]
    pub value: FilterValue,
}

impl LineageFilter {
    pub fn new(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}
