use std::collections::{BTreeMap, HashSet};

use shared::{draft::FieldValue, error::ValidationRejected};

use crate::error::FlowError;

/// Status recorded once every content step has been committed. It is not
/// mapped to any step, so resuming falls through to the preview.
pub const PREVIEW_STATUS: &str = "preview";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepId(pub &'static str);

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    Text {
        min_len: usize,
        max_len: usize,
        /// Case-insensitive substrings that may not appear.
        forbidden: Vec<&'static str>,
    },
    Integer {
        min: i64,
        max: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub rule: FieldRule,
    pub required: bool,
    pub multiline: bool,
}

impl FieldSpec {
    pub fn text(key: &'static str, label: &'static str, min_len: usize, max_len: usize) -> Self {
        Self {
            key,
            label,
            rule: FieldRule::Text {
                min_len,
                max_len,
                forbidden: Vec::new(),
            },
            required: true,
            multiline: false,
        }
    }

    pub fn integer(key: &'static str, label: &'static str, min: i64, max: i64) -> Self {
        Self {
            key,
            label,
            rule: FieldRule::Integer { min, max },
            required: true,
            multiline: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    pub fn forbid(mut self, pattern: &'static str) -> Self {
        if let FieldRule::Text { forbidden, .. } = &mut self.rule {
            forbidden.push(pattern);
        }
        self
    }

    pub fn validate(&self, raw: Option<&str>) -> Result<FieldValue, ValidationRejected> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return if self.required {
                Err(self.reject("is required"))
            } else {
                Ok(FieldValue::Skipped)
            };
        }

        match &self.rule {
            FieldRule::Text {
                min_len,
                max_len,
                forbidden,
            } => {
                let len = raw.chars().count();
                if len < *min_len || len > *max_len {
                    return Err(self.reject(format!(
                        "must be between {min_len} and {max_len} characters (got {len})"
                    )));
                }
                let lowered = raw.to_lowercase();
                if let Some(pattern) = forbidden
                    .iter()
                    .find(|pattern| lowered.contains(&pattern.to_lowercase()))
                {
                    return Err(self.reject(format!("may not contain \"{pattern}\"")));
                }
                Ok(FieldValue::Text(raw.to_string()))
            }
            FieldRule::Integer { min, max } => {
                let value: i64 = raw
                    .parse()
                    .map_err(|_| self.reject("must be a whole number"))?;
                if value < *min || value > *max {
                    return Err(self.reject(format!("must be between {min} and {max}")));
                }
                Ok(FieldValue::Integer(value))
            }
        }
    }

    fn reject(&self, reason: impl Into<String>) -> ValidationRejected {
        ValidationRejected::new(self.label, reason)
    }
}

/// Validates a whole field group; the first failing field rejects the group.
pub fn validate_fields(
    fields: &[FieldSpec],
    submitted: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, FieldValue>, ValidationRejected> {
    fields
        .iter()
        .map(|field| {
            field
                .validate(submitted.get(field.key).map(String::as_str))
                .map(|value| (field.key.to_string(), value))
        })
        .collect()
}

/// What happens when a submission fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectPolicy {
    /// Report the problem and keep waiting on the same prompt.
    Reprompt,
    /// The submission cannot be re-prompted; the wizard stops and must be re-invoked.
    Terminate,
}

/// Whether a side-channel step may be passed without content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipPolicy {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Fields {
        title: &'static str,
        fields: Vec<FieldSpec>,
        on_reject: RejectPolicy,
    },
    Choice {
        key: &'static str,
        prompt: &'static str,
        options: Vec<(&'static str, &'static str)>,
    },
    Confirm {
        key: &'static str,
        question: &'static str,
        /// Where "no" leads; `None` goes straight to the preview.
        on_no: Option<StepId>,
    },
    SideChannel {
        key: &'static str,
        label: &'static str,
        instructions: &'static str,
        skip: SkipPolicy,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    pub id: StepId,
    /// Persisted status that resumes at this step.
    pub status: &'static str,
    pub label: &'static str,
    pub kind: StepKind,
    pub editable: bool,
}

impl StepDescriptor {
    pub fn new(id: &'static str, label: &'static str, kind: StepKind) -> Self {
        Self {
            id: StepId(id),
            status: id,
            label,
            kind,
            editable: true,
        }
    }

    pub fn locked(mut self) -> Self {
        self.editable = false;
        self
    }
}

/// A step table. Declaration order is the creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardFlow {
    pub name: &'static str,
    pub title: &'static str,
    pub steps: Vec<StepDescriptor>,
}

impl WizardFlow {
    pub fn first(&self) -> Option<&StepDescriptor> {
        self.steps.first()
    }

    pub fn step(&self, id: StepId) -> Option<&StepDescriptor> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn step_named(&self, name: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|step| step.id.0 == name)
    }

    pub fn step_for_status(&self, status: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|step| step.status == status)
    }

    /// Status a creation commit of `id` advances the draft to.
    pub fn status_after(&self, id: StepId) -> &'static str {
        self.steps
            .iter()
            .position(|step| step.id == id)
            .and_then(|position| self.steps.get(position + 1))
            .map(|step| step.status)
            .unwrap_or(PREVIEW_STATUS)
    }

    /// Position of `status` in the stage order; anything unmapped sorts last.
    pub fn stage_of(&self, status: Option<&str>) -> usize {
        status
            .and_then(|status| self.steps.iter().position(|step| step.status == status))
            .unwrap_or(self.steps.len())
    }

    pub fn editable_steps(&self) -> impl Iterator<Item = &StepDescriptor> {
        self.steps.iter().filter(|step| step.editable)
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        if self.steps.is_empty() {
            return Err(FlowError::precondition(format!(
                "flow {} has no steps",
                self.name
            )));
        }

        let mut ids = HashSet::new();
        let mut statuses = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.id) {
                return Err(FlowError::precondition(format!(
                    "flow {} declares step {} twice",
                    self.name, step.id
                )));
            }
            if step.status == PREVIEW_STATUS || !statuses.insert(step.status) {
                return Err(FlowError::precondition(format!(
                    "flow {} has an ambiguous status {}",
                    self.name, step.status
                )));
            }
        }

        for step in &self.steps {
            if let StepKind::Confirm {
                on_no: Some(target),
                ..
            } = &step.kind
            {
                if self.step(*target).is_none() {
                    return Err(FlowError::precondition(format!(
                        "flow {} jumps to unknown step {target}",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}
