//! Style declarations: the mutable inline style carried by clones and the
//! read-only resolved style snapshot handed over by the host.

use crate::css::parse_declarations;
use crate::util::px_value;

/// A single `name: value [!important]` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

impl Declaration {
    pub fn new(name: impl Into<String>, value: impl Into<String>, important: bool) -> Self {
        Self {
            name: normalize_name(&name.into()),
            value: value.into(),
            important,
        }
    }

    fn to_css(&self) -> String {
        if self.important {
            format!("{}: {} !important;", self.name, self.value)
        } else {
            format!("{}: {};", self.name, self.value)
        }
    }
}

fn normalize_name(name: &str) -> String {
    let name = name.trim();
    // custom properties are case-sensitive
    if name.starts_with("--") {
        name.to_string()
    } else {
        name.to_ascii_lowercase()
    }
}

/// Inline style of a cloned element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDeclaration {
    entries: Vec<Declaration>,
}

impl StyleDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut style = Self::new();
        style.set_css_text(text);
        style
    }

    /// Replace the whole declaration with the parsed `text`
    pub fn set_css_text(&mut self, text: &str) {
        self.entries.clear();
        for decl in parse_declarations(text) {
            self.set_property(&decl.name, &decl.value, decl.important);
        }
    }

    pub fn css_text(&self) -> String {
        self.entries
            .iter()
            .map(Declaration::to_css)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = normalize_name(name);
        self.entries
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }

    pub fn is_important(&self, name: &str) -> bool {
        let name = normalize_name(name);
        self.entries.iter().any(|d| d.name == name && d.important)
    }

    /// Set a property in place, keeping its position when it already exists.
    /// An empty value removes the property.
    pub fn set_property(&mut self, name: &str, value: &str, important: bool) {
        let value = value.trim();
        if value.is_empty() {
            self.remove_property(name);
            return;
        }
        let name = normalize_name(name);
        match self.entries.iter_mut().find(|d| d.name == name) {
            Some(existing) => {
                existing.value = value.to_string();
                existing.important = important;
            }
            None => self.entries.push(Declaration {
                name,
                value: value.to_string(),
                important,
            }),
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Declaration> {
        let name = normalize_name(name);
        let idx = self.entries.iter().position(|d| d.name == name)?;
        Some(self.entries.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolved (computed) style of a source node as reported by the host.
///
/// Hosts either hand over a serialized block (`css_text`), individual
/// properties, or both. The cloner prefers the serialized block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputedStyle {
    css_text: Option<String>,
    properties: Vec<Declaration>,
}

impl ComputedStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_properties<I, K, V>(props: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            css_text: None,
            properties: props
                .into_iter()
                .map(|(k, v)| Declaration::new(k, v, false))
                .collect(),
        }
    }

    pub fn with_css_text(mut self, text: impl Into<String>) -> Self {
        self.css_text = Some(text.into());
        self
    }

    pub fn with_property(mut self, name: &str, value: &str, important: bool) -> Self {
        self.properties.push(Declaration::new(name, value, important));
        self
    }

    /// Serialized style block, if the host exposes a non-empty one
    pub fn css_text(&self) -> Option<&str> {
        self.css_text.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn properties(&self) -> &[Declaration] {
        &self.properties
    }

    /// Value of a property, falling back to the serialized block
    pub fn get(&self, name: &str) -> Option<String> {
        let name = normalize_name(name);
        if let Some(d) = self.properties.iter().find(|d| d.name == name) {
            return Some(d.value.clone());
        }
        self.css_text().and_then(|text| {
            parse_declarations(text)
                .into_iter()
                .find(|d| d.name == name)
                .map(|d| d.value)
        })
    }

    /// Pixel value of a length property; missing or non-pixel values are 0
    pub fn px(&self, name: &str) -> f64 {
        self.get(name).map(|v| px_value(&v)).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_property_keeps_position_and_removes_empty() {
        let mut style = StyleDeclaration::parse("a: 1; b: 2");
        style.set_property("a", "3", true);
        assert_eq!(style.css_text(), "a: 3 !important; b: 2;");
        style.set_property("b", "", false);
        assert_eq!(style.css_text(), "a: 3 !important;");
        assert!(style.is_important("a"));
    }

    #[test]
    fn css_text_replaces_wholesale() {
        let mut style = StyleDeclaration::parse("color: blue");
        style.set_css_text("margin: 0");
        assert_eq!(style.get("color"), None);
        assert_eq!(style.get("margin"), Some("0"));
    }

    #[test]
    fn computed_style_falls_back_to_css_text() {
        let cs = ComputedStyle::new().with_css_text("border-left-width: 3px; content: \"x\"");
        assert_eq!(cs.get("content").as_deref(), Some("\"x\""));
        assert_eq!(cs.px("border-left-width"), 3.0);
        assert_eq!(cs.px("border-right-width"), 0.0);
    }

    #[test]
    fn custom_properties_keep_case() {
        let style = StyleDeclaration::parse("--Main-Color: red; COLOR: blue");
        assert_eq!(style.get("--Main-Color"), Some("red"));
        assert_eq!(style.get("color"), Some("blue"));
    }
}
