use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::step::Step;

/// A single violated field in an inbound sequence payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Path of the offending field, e.g. `steps[1].delay`.
    pub path: String,
    pub message: String,
}

/// Structured validation failure listing every violated field of a payload.
///
/// Returned by [`Sequence::parse`] instead of bailing on the first problem, so
/// the HTTP caller gets per-field detail in one response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("invalid sequence payload: {}", .violations.iter().map(|v| format!("{}: {}", v.path, v.message)).collect::<Vec<_>>().join("; "))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

/// The two states of a sequence, derived from the cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceState {
    /// There is at least one step left to execute.
    Pending,
    /// The cursor has reached the step count; nothing left to execute.
    Complete,
}

impl fmt::Display for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceState::Pending => write!(f, "PENDING"),
            SequenceState::Complete => write!(f, "COMPLETE"),
        }
    }
}

/// The full unit of work tracked end-to-end: an ordered list of steps plus a
/// progress cursor, opaque metadata, and an optional completion callback.
///
/// A sequence has no server-side row anywhere; the value itself travels inside
/// the broker message and is re-delivered with an incremented cursor after
/// every successful step. Advancing therefore produces a new value and never
/// mutates in place (concurrent duplicate deliveries of the same tick may
/// alias the same logical sequence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    pub steps: Vec<Step>,
    /// Index of the next step to execute; equal to `steps.len()` once complete.
    #[serde(default)]
    pub current_step_index: usize,
    /// Carried through unchanged, delivered to the completion callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Invoked once the cursor reaches the step count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl Sequence {
    /// Validate an untyped wire payload into a [`Sequence`].
    ///
    /// Collects every violation rather than stopping at the first, naming the
    /// exact field path of each. An empty `steps` array is legal: such a
    /// sequence is immediately complete, not invalid.
    pub fn parse(raw: &Value) -> Result<Self, ValidationError> {
        let mut violations = Vec::new();

        let Some(obj) = raw.as_object() else {
            return Err(ValidationError {
                violations: vec![Violation {
                    path: "(root)".into(),
                    message: "expected a JSON object".into(),
                }],
            });
        };

        let mut steps = Vec::new();
        let mut steps_valid = false;
        match obj.get("steps") {
            Some(Value::Array(entries)) => {
                steps_valid = true;
                for (i, entry) in entries.iter().enumerate() {
                    match parse_step(entry, i, &mut violations) {
                        Some(step) => steps.push(step),
                        None => steps_valid = false,
                    }
                }
            }
            Some(_) => violations.push(Violation {
                path: "steps".into(),
                message: "must be an array".into(),
            }),
            None => violations.push(Violation {
                path: "steps".into(),
                message: "is required".into(),
            }),
        }

        let current_step_index = match obj.get("currentStepIndex") {
            None | Some(Value::Null) => 0,
            Some(value) => match value.as_u64() {
                Some(index) => {
                    let index = index as usize;
                    // Range is only checkable once the step list itself parsed.
                    if steps_valid && index > steps.len() {
                        violations.push(Violation {
                            path: "currentStepIndex".into(),
                            message: format!(
                                "must be within [0, {}], got {index}",
                                steps.len()
                            ),
                        });
                    }
                    index
                }
                None => {
                    violations.push(Violation {
                        path: "currentStepIndex".into(),
                        message: "must be a non-negative integer".into(),
                    });
                    0
                }
            },
        };

        let metadata = match obj.get("metadata") {
            None | Some(Value::Null) => None,
            Some(value @ Value::Object(_)) => Some(value.clone()),
            Some(_) => {
                violations.push(Violation {
                    path: "metadata".into(),
                    message: "must be an object".into(),
                });
                None
            }
        };

        let callback_url = match obj.get("callbackUrl") {
            None | Some(Value::Null) => None,
            Some(Value::String(url)) => {
                check_url(url, "callbackUrl", &mut violations);
                Some(url.clone())
            }
            Some(_) => {
                violations.push(Violation {
                    path: "callbackUrl".into(),
                    message: "must be a string".into(),
                });
                None
            }
        };

        if !violations.is_empty() {
            return Err(ValidationError { violations });
        }

        Ok(Sequence {
            steps,
            current_step_index,
            metadata,
            callback_url,
        })
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn state(&self) -> SequenceState {
        if self.current_step_index >= self.steps.len() {
            SequenceState::Complete
        } else {
            SequenceState::Pending
        }
    }

    /// The step the cursor points at, if any.
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current_step_index)
    }

    /// A new sequence with the cursor moved past the current step.
    ///
    /// Pure: the receiver is left untouched.
    pub fn advanced(&self) -> Sequence {
        Sequence {
            current_step_index: self.current_step_index + 1,
            ..self.clone()
        }
    }
}

fn parse_step(entry: &Value, index: usize, violations: &mut Vec<Violation>) -> Option<Step> {
    let Some(obj) = entry.as_object() else {
        violations.push(Violation {
            path: format!("steps[{index}]"),
            message: "must be an object".into(),
        });
        return None;
    };

    let before = violations.len();

    let url = match obj.get("url") {
        Some(Value::String(url)) => {
            check_url(url, &format!("steps[{index}].url"), violations);
            url.clone()
        }
        Some(_) => {
            violations.push(Violation {
                path: format!("steps[{index}].url"),
                message: "must be a string".into(),
            });
            String::new()
        }
        None => {
            violations.push(Violation {
                path: format!("steps[{index}].url"),
                message: "is required".into(),
            });
            String::new()
        }
    };

    let payload = match obj.get("payload") {
        Some(value @ Value::Object(_)) => value.clone(),
        Some(_) => {
            violations.push(Violation {
                path: format!("steps[{index}].payload"),
                message: "must be an object".into(),
            });
            Value::Null
        }
        None => {
            violations.push(Violation {
                path: format!("steps[{index}].payload"),
                message: "is required".into(),
            });
            Value::Null
        }
    };

    let delay_seconds = match obj.get("delay") {
        Some(value) => match value.as_u64() {
            Some(delay) => delay,
            None => {
                violations.push(Violation {
                    path: format!("steps[{index}].delay"),
                    message: "must be a non-negative integer number of seconds".into(),
                });
                0
            }
        },
        None => {
            violations.push(Violation {
                path: format!("steps[{index}].delay"),
                message: "is required".into(),
            });
            0
        }
    };

    if violations.len() > before {
        return None;
    }

    Some(Step {
        url,
        payload,
        delay_seconds,
    })
}

fn check_url(url: &str, path: &str, violations: &mut Vec<Violation>) {
    match reqwest::Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
        Ok(_) => violations.push(Violation {
            path: path.into(),
            message: "must be an http(s) URL".into(),
        }),
        Err(_) => violations.push(Violation {
            path: path.into(),
            message: "must be a well-formed absolute URL".into(),
        }),
    }
}
