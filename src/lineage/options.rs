use crate::error::{LineageError, Result};
use crate::types::{LineageDirection, LineageFilter};
use serde::{Deserialize, Serialize};

/// How far the compactor expands from each seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPolicy {
    /// Only the seed's direct neighbours
    Nearest,
    /// Up to the configured parent/child depth
    Specific,
    /// Until a generation holds more than one node
    Multi,
    /// Everything the fetch returned
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupingOptions {
    pub generations: GenerationPolicy,
    pub parent_depth: usize,
    pub child_depth: usize,
    /// Fan-out at which siblings collapse into one combined node. `None` disables combining.
    pub combine_size: Option<usize>,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            generations: GenerationPolicy::Specific,
            parent_depth: 1,
            child_depth: 1,
            combine_size: Some(6),
        }
    }
}

impl GroupingOptions {
    pub fn depth_limit(&self, direction: LineageDirection) -> usize {
        match direction {
            LineageDirection::Parent => self.parent_depth,
            LineageDirection::Children => self.child_depth,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(self.combine_size, Some(size) if size <= 1) {
            return Err(LineageError::invalid_options(
                "combine size must be greater than 1 or disabled",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutDirection {
    /// Up-down
    UD,
    /// Down-up
    DU,
    /// Left-right
    LR,
    /// Right-left
    RL,
}

/// Hierarchical layout defaults handed to the diagram renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutOptions {
    pub direction: LayoutDirection,
    pub hierarchical: bool,
    pub level_separation: u32,
    pub node_spacing: u32,
    pub sort_method: String,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::UD,
            hierarchical: true,
            level_separation: 100,
            node_spacing: 150,
            sort_method: "directed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LineageOptions {
    pub filters: Vec<LineageFilter>,
    /// Apply every filter with `filter_in` when true, `filter_out` otherwise
    pub filter_in: bool,
    pub grouping: GroupingOptions,
    pub layout: LayoutOptions,
}

impl Default for LineageOptions {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            filter_in: true,
            grouping: GroupingOptions::default(),
            layout: LayoutOptions::default(),
        }
    }
}

/// Partial options. Every present field replaces the whole field underneath.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LineageOverrides {
    pub filters: Option<Vec<LineageFilter>>,
    pub filter_in: Option<bool>,
    pub grouping: Option<GroupingOptions>,
    pub layout: Option<LayoutOptions>,
}

impl LineageOptions {
    /// Defaults with each override applied in order, last write wins
    pub fn merged(overrides: &[LineageOverrides]) -> Self {
        let mut options = Self::default();
        for layer in overrides {
            options.apply(layer);
        }
        options
    }

    pub fn apply(&mut self, overrides: &LineageOverrides) {
        if let Some(filters) = &overrides.filters {
            self.filters = filters.clone();
        }
        if let Some(filter_in) = overrides.filter_in {
            self.filter_in = filter_in;
        }
        if let Some(grouping) = &overrides.grouping {
            self.grouping = grouping.clone();
        }
        if let Some(layout) = &overrides.layout {
            self.layout = layout.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(filter) = self.filters.iter().find(|f| f.field.is_empty()) {
            return Err(LineageError::invalid_options(format!(
                "filter on value {:?} has no field",
                filter.value
            )));
        }
        self.grouping.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterValue;

    #[test]
    fn test_overrides_last_write_wins() {
        let first = LineageOverrides {
            filters: Some(vec![LineageFilter::new("type", "Sample")]),
            grouping: Some(GroupingOptions {
                generations: GenerationPolicy::All,
                ..Default::default()
            }),
            ..Default::default()
        };
        let second = LineageOverrides {
            filter_in: Some(false),
            grouping: Some(GroupingOptions {
                generations: GenerationPolicy::Nearest,
                combine_size: None,
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = LineageOptions::merged(&[first, second]);

        assert_eq!(options.filters, vec![LineageFilter::new("type", FilterValue::from("Sample"))]);
        assert!(!options.filter_in);
        assert_eq!(options.grouping.generations, GenerationPolicy::Nearest);
        assert_eq!(options.grouping.combine_size, None);
        assert_eq!(options.layout, LayoutOptions::default());
    }

    #[test]
    fn test_combine_size_validation() {
        let mut grouping = GroupingOptions::default();
        assert!(grouping.validate().is_ok());

        grouping.combine_size = Some(1);
        assert!(grouping.validate().is_err());

        grouping.combine_size = None;
        assert!(grouping.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let options: LineageOptions = serde_yaml::from_str("grouping:\n  generations: multi\n").unwrap();

        assert_eq!(options.grouping.generations, GenerationPolicy::Multi);
        assert_eq!(options.grouping.combine_size, Some(6));
        assert!(options.filter_in);
    }
}
