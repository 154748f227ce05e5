use std::collections::HashMap;

/// Turns a positive label into the text shown to clinicians
pub trait RecommendationLookup: Send + Sync {
    fn recommend(&self, label: &str, percent: i64) -> String;
}

/// Fixed label-to-template table.
///
/// Templates may contain `{label}` and `{percent}`. Labels without a
/// template render as `"<label> (<percent>%)"`.
#[derive(Debug, Clone, Default)]
pub struct StaticRecommendations {
    templates: HashMap<String, String>,
}

impl StaticRecommendations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, label: impl Into<String>, template: impl Into<String>) -> Self {
        self.templates.insert(label.into(), template.into());
        self
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl RecommendationLookup for StaticRecommendations {
    fn recommend(&self, label: &str, percent: i64) -> String {
        match self.templates.get(label) {
            Some(template) => template
                .replace("{label}", label)
                .replace("{percent}", &percent.to_string()),
            None => format!("{} ({}%)", label, percent),
        }
    }
}

impl FromIterator<(String, String)> for StaticRecommendations {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            templates: iter.into_iter().collect(),
        }
    }
}
