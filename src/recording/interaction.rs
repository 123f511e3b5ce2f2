use crate::location::Location;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What the user is expected to do on a step's target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click,
    /// Typing into a field. `expected` is a substring the final value must contain.
    Input { expected: Option<String> },
    /// Picking a value in a selection control. `expected` must match exactly.
    Change { expected: Option<String> },
    Focus,
    Hover,
    /// An interaction whose purpose is to move to another page.
    Navigation,
}

impl Action {
    /// Wire name, also used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Input { .. } => "input",
            Self::Change { .. } => "change",
            Self::Focus => "focus",
            Self::Hover => "hover",
            Self::Navigation => "navigation",
        }
    }

    /// Expected value for input/change steps.
    pub fn expected_value(&self) -> Option<&str> {
        match self {
            Self::Input { expected } | Self::Change { expected } => expected.as_deref(),
            _ => None,
        }
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self, Self::Navigation)
    }
}

const ACTION_NAMES: &[&str] = &["click", "input", "change", "focus", "hover", "navigation"];

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a step was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Absolute URL of the page the step happened on.
    #[serde(default)]
    pub url: String,
    /// Path component, when the recorder captured it separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl PageInfo {
    /// Location used for matching against the current page.
    ///
    /// An explicit `path` wins over the path embedded in `url`, but the host
    /// still comes from `url`.
    pub fn location(&self) -> Location {
        let base = Location::parse(&self.url);
        match self.path.as_deref() {
            Some(path) if !path.trim().is_empty() => base.with_path(path),
            _ => base,
        }
    }

    fn is_empty(&self) -> bool {
        self.url.trim().is_empty() && self.path.as_deref().map_or(true, |p| p.trim().is_empty())
    }
}

/// Recorded description of one step's target element.
///
/// Serialized with the recorder's field names (`tagName`, `pageInfo`, ...).
/// Validation happens once, at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInteraction", into = "RawInteraction")]
pub struct Interaction {
    pub action: Action,
    /// Text expected on or under the target.
    pub text: Option<String>,
    /// Lowercase tag name.
    pub tag_name: Option<String>,
    pub attributes: BTreeMap<String, String>,
    /// Structural path expression recorded for the target.
    pub xpath: Option<String>,
    pub page_info: PageInfo,
}

impl Interaction {
    /// Build a descriptor in code. Mostly useful for tests and tooling.
    pub fn new(action: Action, page_url: impl Into<String>) -> Self {
        Self {
            action,
            text: None,
            tag_name: None,
            attributes: BTreeMap::new(),
            xpath: None,
            page_info: PageInfo {
                url: page_url.into(),
                path: None,
            },
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = non_empty(Some(text.into()));
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = non_empty(Some(tag.into())).map(|t| t.to_ascii_lowercase());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = non_empty(Some(xpath.into()));
        self
    }

    /// Recorded ARIA role, if any.
    pub fn role(&self) -> Option<&str> {
        self.attributes.get("role").map(|s| s.as_str())
    }

    /// A descriptor without text, tag or locator cannot be resolved.
    pub fn is_usable(&self) -> bool {
        self.text.is_some() || self.tag_name.is_some() || self.xpath.is_some()
    }

    /// Whether performing this interaction should take the user somewhere
    /// other than `current`.
    pub fn expects_navigation(&self, current: &Location) -> bool {
        if self.action.is_navigation() {
            return true;
        }
        self.attributes
            .get("href")
            .and_then(|href| self.page_info.location().join(href))
            .is_some_and(|dest| !dest.matches(current))
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action)?;
        if let Some(ref tag) = self.tag_name {
            write!(f, " <{}>", tag)?;
        }
        if let Some(role) = self.role() {
            write!(f, " role=\"{}\"", role)?;
        }
        if let Some(ref text) = self.text {
            let shown: String = text.chars().take(40).collect();
            write!(f, " \"{}\"", shown)?;
        }
        Ok(())
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

/// Wire form of [`Interaction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInteraction {
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default)]
    page_info: PageInfo,
}

impl TryFrom<RawInteraction> for Interaction {
    type Error = String;

    fn try_from(raw: RawInteraction) -> Result<Self, Self::Error> {
        let value = non_empty(raw.value);
        let action = match raw.action.to_ascii_lowercase().as_str() {
            "click" => Action::Click,
            "input" | "type" => Action::Input { expected: value },
            "change" | "select" => Action::Change { expected: value },
            "focus" => Action::Focus,
            "hover" => Action::Hover,
            "navigation" | "navigate" => Action::Navigation,
            other => {
                return Err(format!(
                    "unknown action '{}', expected one of: {}",
                    other,
                    ACTION_NAMES.join(", ")
                ))
            }
        };
        if raw.page_info.is_empty() {
            return Err(format!("{} interaction is missing pageInfo.url", action));
        }
        Ok(Self {
            action,
            text: non_empty(raw.text),
            tag_name: non_empty(raw.tag_name).map(|t| t.to_ascii_lowercase()),
            attributes: raw.attributes,
            xpath: non_empty(raw.xpath),
            page_info: raw.page_info,
        })
    }
}

impl From<Interaction> for RawInteraction {
    fn from(i: Interaction) -> Self {
        let value = i.action.expected_value().map(str::to_string);
        Self {
            action: i.action.name().to_string(),
            text: i.text,
            tag_name: i.tag_name,
            attributes: i.attributes,
            xpath: i.xpath,
            value,
            page_info: i.page_info,
        }
    }
}
