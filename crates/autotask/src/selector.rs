use serde::{Deserialize, Serialize};

use crate::element::{ElementNode, Point};

/// Which node field a locator compares against the criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementMatchStrategy {
    /// Resource id, either the full name or the part after the last `/`
    #[default]
    ById,
    /// Exact text
    ByText,
    /// Exact content description
    ByDescription,
    /// Raw `x,y` screen coordinate, no lookup is performed
    ByCoordinates,
    /// Class name; collects every match instead of the first
    ByClassName,
}

impl ElementMatchStrategy {
    /// Whether `node` satisfies `criterion` under this strategy.
    ///
    /// Always false for `ByCoordinates`, which never inspects the tree.
    pub fn matches(&self, node: &ElementNode, criterion: &str) -> bool {
        match self {
            ElementMatchStrategy::ById => match node.resource_id() {
                Some(id) => id == criterion || node.short_id() == Some(criterion),
                None => false,
            },
            ElementMatchStrategy::ByText => node.text() == Some(criterion),
            ElementMatchStrategy::ByDescription => node.description() == Some(criterion),
            ElementMatchStrategy::ByClassName => node.class_name() == Some(criterion),
            ElementMatchStrategy::ByCoordinates => false,
        }
    }

    pub fn collects_all(&self) -> bool {
        matches!(self, ElementMatchStrategy::ByClassName)
    }

    pub fn bypasses_lookup(&self) -> bool {
        matches!(self, ElementMatchStrategy::ByCoordinates)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementMatchStrategy::ById => "id",
            ElementMatchStrategy::ByText => "text",
            ElementMatchStrategy::ByDescription => "desc",
            ElementMatchStrategy::ByCoordinates => "coords",
            ElementMatchStrategy::ByClassName => "class",
        }
    }
}

impl std::fmt::Display for ElementMatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A strategy paired with its criterion
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Id(String),
    Text(String),
    Description(String),
    ClassName(String),
    Coordinates(Point),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    pub fn strategy(&self) -> Option<ElementMatchStrategy> {
        match self {
            Selector::Id(_) => Some(ElementMatchStrategy::ById),
            Selector::Text(_) => Some(ElementMatchStrategy::ByText),
            Selector::Description(_) => Some(ElementMatchStrategy::ByDescription),
            Selector::ClassName(_) => Some(ElementMatchStrategy::ByClassName),
            Selector::Coordinates(_) => Some(ElementMatchStrategy::ByCoordinates),
            Selector::Invalid(_) => None,
        }
    }

    /// The criterion string an action stores for this selector.
    pub fn criterion(&self) -> String {
        match self {
            Selector::Id(v)
            | Selector::Text(v)
            | Selector::Description(v)
            | Selector::ClassName(v)
            | Selector::Invalid(v) => v.clone(),
            Selector::Coordinates(p) => p.to_string(),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.strategy() {
            Some(strategy) => write!(f, "{strategy}:{}", self.criterion()),
            None => write!(f, "invalid:{}", self.criterion()),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Selector::Invalid("Selector is empty".to_string());
        }

        let lower = s.to_lowercase();
        let value_after = |prefix: &str| s[prefix.len()..].trim().to_string();

        match s {
            _ if lower.starts_with("id:") => Selector::Id(value_after("id:")),
            _ if lower.starts_with("text:") => Selector::Text(value_after("text:")),
            _ if lower.starts_with("description:") => {
                Selector::Description(value_after("description:"))
            }
            _ if lower.starts_with("desc:") => Selector::Description(value_after("desc:")),
            _ if lower.starts_with("classname:") => Selector::ClassName(value_after("classname:")),
            _ if lower.starts_with("class:") => Selector::ClassName(value_after("class:")),
            _ if lower.starts_with("coords:") => match s["coords:".len()..].parse::<Point>() {
                Ok(point) => Selector::Coordinates(point),
                Err(e) => Selector::Invalid(e.to_string()),
            },
            _ if s.starts_with('#') => Selector::Id(s[1..].to_string()),
            // Bare "x,y" is a coordinate, anything else is visible text
            _ => match s.parse::<Point>() {
                Ok(point) => Selector::Coordinates(point),
                Err(_) => Selector::Text(s.to_string()),
            },
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}
