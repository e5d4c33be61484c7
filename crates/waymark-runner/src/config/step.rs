use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use waymark_agent::target::alternatives;
use waymark_agent::DEFAULT_THRESHOLD;

/// What a step asks the user to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Click,
    Input,
    Navigate,
    LocalAction,
    Wait,
    HighlightArea,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Click => "click",
            StepType::Input => "input",
            StepType::Navigate => "navigate",
            StepType::LocalAction => "local_action",
            StepType::Wait => "wait",
            StepType::HighlightArea => "highlight_area",
        }
    }

    /// Steps the user performs without an element lookup.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            StepType::Navigate | StepType::LocalAction | StepType::Wait
        )
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD
}

fn is_default_threshold(t: &u8) -> bool {
    *t == DEFAULT_THRESHOLD
}

/// One step of a tutorial, in the verbose (authoring) schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(rename = "type")]
    pub step_type: StepType,

    /// Label text, optionally `|`-separated alternatives.
    #[serde(default)]
    pub trigger: String,

    /// Second endpoint for `highlight_area`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_end: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Page the step expects to run on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub is_entry_point: bool,

    /// Match strictness, 0-100.
    #[serde(default = "default_threshold")]
    pub match_threshold: u8,
}

impl Step {
    /// A step of the given type with everything else defaulted.
    pub fn new(step_type: StepType) -> Self {
        Self {
            step_type,
            trigger: String::new(),
            trigger_end: None,
            description: String::new(),
            url: None,
            url_pattern: None,
            example_value: None,
            instruction: None,
            optional: false,
            is_entry_point: false,
            match_threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn click(trigger: &str) -> Self {
        Self {
            trigger: trigger.into(),
            ..Self::new(StepType::Click)
        }
    }

    pub fn navigate(url: &str) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::new(StepType::Navigate)
        }
    }

    /// Whether resolving this step needs a trigger.
    pub fn requires_trigger(&self) -> bool {
        !self.step_type.is_local()
    }

    /// Trigger used for lookup; the description stands in when it is empty.
    pub fn effective_trigger(&self) -> &str {
        if self.trigger.trim().is_empty() {
            self.description.trim()
        } else {
            self.trigger.trim()
        }
    }

    /// Text shown in tooltips and lists.
    pub fn title(&self) -> &str {
        if !self.description.trim().is_empty() {
            self.description.trim()
        } else if !self.trigger.trim().is_empty() {
            self.trigger.trim()
        } else {
            self.step_type.as_str()
        }
    }

    pub(crate) fn validate(&self, index: usize) -> Result<()> {
        if self.requires_trigger() && alternatives(&self.trigger).is_empty() {
            return Err(Error::MalformedTutorial(format!(
                "step {}: {} step needs a trigger",
                index + 1,
                self.step_type
            )));
        }
        if self.step_type == StepType::HighlightArea
            && self
                .trigger_end
                .as_deref()
                .map_or(true, |t| alternatives(t).is_empty())
        {
            return Err(Error::MalformedTutorial(format!(
                "step {}: highlight_area needs triggerEnd",
                index + 1
            )));
        }
        if self.match_threshold > 100 {
            return Err(Error::MalformedTutorial(format!(
                "step {}: matchThreshold {} is outside 0-100",
                index + 1,
                self.match_threshold
            )));
        }
        Ok(())
    }
}

/// Compact step schema used in distributed payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactStep {
    pub t: StepType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub d: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub te: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub o: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub e: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<String>,
    /// Only present when not the default.
    #[serde(default = "default_threshold", skip_serializing_if = "is_default_threshold")]
    pub mt: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idx: Option<usize>,
}

fn non_empty(s: &Option<String>) -> Option<String> {
    s.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl CompactStep {
    pub fn from_step(step: &Step, index: usize) -> Self {
        Self {
            t: step.step_type,
            d: step.description.clone(),
            tr: Some(step.trigger.clone()).filter(|t| !t.is_empty()),
            te: non_empty(&step.trigger_end),
            u: non_empty(&step.url),
            up: non_empty(&step.url_pattern),
            o: step.optional,
            e: step.is_entry_point,
            v: non_empty(&step.example_value),
            i: non_empty(&step.instruction),
            mt: step.match_threshold,
            idx: Some(index),
        }
    }

    pub fn into_step(self) -> Step {
        Step {
            step_type: self.t,
            trigger: self.tr.unwrap_or_default(),
            trigger_end: self.te.filter(|t| !t.is_empty()),
            description: self.d,
            url: self.u.filter(|u| !u.is_empty()),
            url_pattern: self.up.filter(|u| !u.is_empty()),
            example_value: self.v,
            instruction: self.i,
            optional: self.o,
            is_entry_point: self.e,
            match_threshold: self.mt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_defaults() {
        let step: Step = serde_json::from_str(r#"{"type":"click","trigger":"Save"}"#).unwrap();
        assert_eq!(step.step_type, StepType::Click);
        assert_eq!(step.match_threshold, 50);
        assert!(!step.optional);
        assert!(!step.is_entry_point);
        assert!(step.validate(0).is_ok());
    }

    #[test]
    fn verbose_camel_case_fields() {
        let step: Step = serde_json::from_str(
            r#"{"type":"highlight_area","trigger":"Name","triggerEnd":"Email",
                "isEntryPoint":true,"matchThreshold":80,"urlPattern":"/users/*"}"#,
        )
        .unwrap();
        assert_eq!(step.trigger_end.as_deref(), Some("Email"));
        assert!(step.is_entry_point);
        assert_eq!(step.match_threshold, 80);
        assert_eq!(step.url_pattern.as_deref(), Some("/users/*"));
    }

    #[test]
    fn validation_rules() {
        assert!(Step::new(StepType::Click).validate(0).is_err());
        assert!(Step::new(StepType::Navigate).validate(0).is_ok());
        assert!(Step::new(StepType::Wait).validate(0).is_ok());
        assert!(Step::new(StepType::LocalAction).validate(0).is_ok());

        let mut area = Step::click("Start");
        area.step_type = StepType::HighlightArea;
        let err = area.validate(2).unwrap_err().to_string();
        assert!(err.contains("step 3"), "{}", err);
        area.trigger_end = Some("End".into());
        assert!(area.validate(2).is_ok());

        let mut strict = Step::click("x");
        strict.match_threshold = 101;
        assert!(strict.validate(0).is_err());
    }

    #[test]
    fn trigger_without_alternatives_is_rejected() {
        for trigger in ["|", " | ", "||"] {
            let err = Step::click(trigger).validate(0).unwrap_err();
            assert!(matches!(err, Error::MalformedTutorial(_)), "{:?}", trigger);
        }
        assert!(Step::click("|Save").validate(0).is_ok());

        let mut area = Step::click("Start");
        area.step_type = StepType::HighlightArea;
        area.trigger_end = Some(" | ".into());
        assert!(area.validate(0).is_err());
    }

    #[test]
    fn compact_omits_default_threshold() {
        let step = Step::click("Save");
        let json = serde_json::to_value(CompactStep::from_step(&step, 0)).unwrap();
        assert_eq!(json["t"], "click");
        assert_eq!(json["tr"], "Save");
        assert_eq!(json["idx"], 0);
        assert!(json.get("mt").is_none());
        assert!(json.get("o").is_none());

        let mut strict = step.clone();
        strict.match_threshold = 90;
        strict.optional = true;
        let json = serde_json::to_value(CompactStep::from_step(&strict, 4)).unwrap();
        assert_eq!(json["mt"], 90);
        assert_eq!(json["o"], true);
    }

    #[test]
    fn compact_into_verbose() {
        let c: CompactStep = serde_json::from_str(
            r#"{"t":"navigate","d":"Open dashboard","u":"https://x/dashboard","up":"","e":true,"idx":1}"#,
        )
        .unwrap();
        let step = c.into_step();
        assert_eq!(step.step_type, StepType::Navigate);
        assert_eq!(step.url.as_deref(), Some("https://x/dashboard"));
        assert_eq!(step.url_pattern, None);
        assert!(step.is_entry_point);
        assert_eq!(step.match_threshold, 50);
    }

    #[test]
    fn effective_trigger_falls_back_to_description() {
        let mut step = Step::new(StepType::Click);
        step.description = " Open menu ".into();
        assert_eq!(step.effective_trigger(), "Open menu");
        step.trigger = "Menu".into();
        assert_eq!(step.effective_trigger(), "Menu");
        assert_eq!(step.title(), "Open menu");
    }
}
