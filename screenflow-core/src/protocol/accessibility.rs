//! Structured UI types exchanged with an accessibility service.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ScreenflowError;
use crate::geometry::Point;

use super::control::SystemKey;

/// One node of the on-screen view hierarchy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScreenView {
    pub unique_id: String,
    pub text: String,
    pub children: Vec<ScreenView>,
}

impl ScreenView {
    /// Depth-first search for the first node matching `selector`.
    pub fn find(&self, selector: &CompiledSelector) -> Option<&ScreenView> {
        if selector.matches(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(selector))
    }
}

/// Identifies an element by unique id and/or a text pattern.
///
/// Empty criteria are ignored; a selector with no criteria matches the
/// root node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementSelector {
    pub unique_id: Option<String>,
    pub pattern: Option<String>,
}

impl ElementSelector {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            unique_id: Some(id.into()),
            pattern: None,
        }
    }

    pub fn by_text(pattern: impl Into<String>) -> Self {
        Self {
            unique_id: None,
            pattern: Some(pattern.into()),
        }
    }

    /// Compile the text pattern once for repeated tree searches.
    pub fn compile(&self) -> Result<CompiledSelector, ScreenflowError> {
        let pattern = match self.pattern.as_deref() {
            Some(p) if !p.is_empty() => Some(Regex::new(p)?),
            _ => None,
        };
        Ok(CompiledSelector {
            unique_id: self.unique_id.clone().filter(|id| !id.is_empty()),
            pattern,
        })
    }
}

/// An [`ElementSelector`] with its pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    unique_id: Option<String>,
    pattern: Option<Regex>,
}

impl CompiledSelector {
    /// Whether `node` itself satisfies every criterion.
    pub fn matches(&self, node: &ScreenView) -> bool {
        if let Some(id) = &self.unique_id {
            if node.unique_id != *id {
                return false;
            }
        }
        if let Some(rx) = &self.pattern {
            if !rx.is_match(&node.text) {
                return false;
            }
        }
        true
    }
}

/// Where an accessibility click lands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClickTarget {
    Point(Point),
    Element(ElementSelector),
}

/// Where an accessibility swipe starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SwipeStart {
    Point(Point),
    Element(ElementSelector),
}

/// System-wide accessibility actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GlobalAction {
    Home,
    Back,
    Recents,
}

impl From<SystemKey> for GlobalAction {
    fn from(key: SystemKey) -> Self {
        match key {
            SystemKey::Home => GlobalAction::Home,
            SystemKey::Back => GlobalAction::Back,
            SystemKey::Recents => GlobalAction::Recents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, text: &str, children: Vec<ScreenView>) -> ScreenView {
        ScreenView {
            unique_id: id.into(),
            text: text.into(),
            children,
        }
    }

    fn tree() -> ScreenView {
        node(
            "root",
            "",
            vec![
                node("title", "Settings", vec![]),
                node("list", "", vec![node("wifi", "Wi-Fi: on", vec![])]),
            ],
        )
    }

    #[test]
    fn finds_nested_node_by_pattern() {
        let sel = ElementSelector::by_text("^Wi-Fi").compile().unwrap();
        let found = tree().find(&sel).cloned().unwrap();
        assert_eq!(found.unique_id, "wifi");
    }

    #[test]
    fn id_and_pattern_must_both_match() {
        let sel = ElementSelector {
            unique_id: Some("title".into()),
            pattern: Some("Wi-Fi".into()),
        }
        .compile()
        .unwrap();
        assert!(tree().find(&sel).is_none());
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = ElementSelector::by_text("(unclosed").compile().unwrap_err();
        assert!(matches!(err, ScreenflowError::Accessibility(_)));
    }

    #[test]
    fn system_key_maps_to_global_action() {
        assert_eq!(GlobalAction::from(SystemKey::Recents), GlobalAction::Recents);
    }
}
