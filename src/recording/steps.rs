use super::Interaction;
use crate::location::Location;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One step of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Defines the total order of the recording. Unique, not necessarily contiguous.
    pub position: i64,
    pub interaction: Interaction,
    /// Instruction shown to the user.
    #[serde(default)]
    pub annotation: String,
}

impl Step {
    pub fn new(position: i64, interaction: Interaction, annotation: impl Into<String>) -> Self {
        Self {
            position,
            interaction,
            annotation: annotation.into(),
        }
    }

    /// Location the step is expected to happen on.
    pub fn location(&self) -> Location {
        self.interaction.page_info.location()
    }
}

/// A recorded guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Recording {
    /// Load a recording from a JSON or YAML file (by extension).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Self::parse_yaml(&content)
        } else {
            Self::parse_json(&content)
        }
    }

    pub fn parse_json(json: &str) -> Result<Self> {
        let recording: Recording = serde_json::from_str(json)?;
        recording.validate()?;
        Ok(recording)
    }

    pub fn parse_yaml(yaml: &str) -> Result<Self> {
        let recording: Recording = serde_yaml::from_str(yaml)?;
        recording.validate()?;
        Ok(recording)
    }

    /// Check recording-level invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidRecording("id is required".into()));
        }
        let mut seen = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if !seen.insert(step.position) {
                return Err(Error::InvalidRecording(format!(
                    "duplicate step position {} in recording '{}'",
                    step.position, self.id
                )));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            step_count: self.steps.len(),
        }
    }
}

/// Listing entry for a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub step_count: usize,
}

/// A recording plus its steps sorted by position.
///
/// The sorted view is built once per load. Every step index used by the
/// engine indexes into [`LoadedRecording::steps`], never into the raw list.
#[derive(Debug, Clone)]
pub struct LoadedRecording {
    recording: Recording,
    sorted: Vec<Step>,
}

impl LoadedRecording {
    pub fn new(recording: Recording) -> Self {
        let mut sorted = recording.steps.clone();
        // stable: equal positions keep their recorded order
        sorted.sort_by_key(|s| s.position);
        Self { recording, sorted }
    }

    pub fn id(&self) -> &str {
        &self.recording.id
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// Steps in ascending position order.
    pub fn steps(&self) -> &[Step] {
        &self.sorted
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.sorted.get(index)
    }

    /// Index into the sorted view of the step with this position.
    pub fn index_of(&self, position: i64) -> Option<usize> {
        self.sorted.iter().position(|s| s.position == position)
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Action;

    fn step(position: i64, text: &str) -> Step {
        Step::new(
            position,
            Interaction::new(Action::Click, "/a").with_text(text),
            format!("click {}", text),
        )
    }

    #[test]
    fn test_parse_recording_json() {
        let json = r#"{
            "id": "onboarding",
            "name": "Onboarding",
            "steps": [
                {"position": 2, "annotation": "Save", "interaction":
                    {"action": "click", "text": "Save", "pageInfo": {"url": "https://app.test/a"}}},
                {"position": 0, "annotation": "Name", "interaction":
                    {"action": "input", "tagName": "input", "value": "x", "pageInfo": {"url": "https://app.test/a"}}}
            ]
        }"#;
        let rec = Recording::parse_json(json).unwrap();
        assert_eq!(rec.id, "onboarding");
        assert_eq!(rec.steps.len(), 2);
        assert_eq!(rec.summary().step_count, 2);
    }

    #[test]
    fn test_parse_recording_yaml() {
        let yaml = r#"
id: tour
steps:
  - position: 1
    annotation: Open settings
    interaction:
      action: click
      text: Settings
      pageInfo:
        url: https://app.test/home
"#;
        let rec = Recording::parse_yaml(yaml).unwrap();
        assert_eq!(rec.steps[0].interaction.text.as_deref(), Some("Settings"));
    }

    #[test]
    fn test_duplicate_positions_rejected() {
        let rec = Recording {
            id: "dup".into(),
            name: None,
            description: None,
            steps: vec![step(1, "a"), step(1, "b")],
        };
        let err = rec.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate step position 1"), "{}", err);
    }

    #[test]
    fn test_missing_id_rejected() {
        let rec = Recording {
            id: " ".into(),
            name: None,
            description: None,
            steps: vec![],
        };
        assert!(rec.validate().is_err());
    }

    #[test]
    fn test_sorted_view_is_stable() {
        let rec = Recording {
            id: "r".into(),
            name: None,
            description: None,
            steps: vec![step(5, "e"), step(1, "a1"), step(3, "c"), step(1, "a2")],
        };
        let loaded = LoadedRecording::new(rec);
        let order: Vec<_> = loaded
            .steps()
            .iter()
            .map(|s| s.interaction.text.clone().unwrap())
            .collect();
        assert_eq!(order, vec!["a1", "a2", "c", "e"]);
        assert!(loaded
            .steps()
            .windows(2)
            .all(|w| w[0].position <= w[1].position));
        assert_eq!(loaded.index_of(3), Some(2));
        assert_eq!(loaded.index_of(4), None);
    }
}
