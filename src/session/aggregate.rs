//! Extraction and merging of inbound message payloads.
//!
//! Without merging, a session simply remembers the last raw message. With
//! merging, each message is searched for a target field and the found value
//! is folded into a running sequence or mapping.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::BridgeError;
use crate::Result;

/// The value a session currently exposes to readers.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregated {
    /// A JSON document (raw message that parsed, or merged state).
    Json(Value),
    /// A raw message that is not JSON, kept verbatim.
    Text(String),
}

impl Aggregated {
    /// Wrap a raw message, decoding it when it is valid JSON.
    pub fn from_raw(raw: &str) -> Self {
        serde_json::from_str(raw)
            .map(Self::Json)
            .unwrap_or_else(|_| Self::Text(raw.to_string()))
    }
}

/// How inbound messages are folded into a session's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Whether to search and merge instead of keeping the last message.
    pub enabled: bool,
    /// Field whose value is extracted from each message.
    pub target: Option<String>,
    /// Field used to collapse a merged sequence to one entry per value.
    pub dedupe_by: Option<String>,
}

impl MergeOptions {
    /// Keep only the last raw message.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Merge the value of `target` across messages.
    pub fn field(target: impl Into<String>) -> Self {
        Self {
            enabled: true,
            target: Some(target.into()),
            dedupe_by: None,
        }
    }

    /// Deduplicate merged sequence entries by `field`.
    pub fn dedupe_by(mut self, field: impl Into<String>) -> Self {
        self.dedupe_by = Some(field.into());
        self
    }

    /// Check the options are usable.
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.target.as_deref().map_or(true, str::is_empty) {
            return Err(BridgeError::InvalidRequest(
                "merge_key is required when merge is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Result of looking at one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// Merge disabled: the message replaces the current value.
    Replace(Aggregated),
    /// Merge enabled: the target field's value, to be merged.
    Merge(Value),
    /// Merge enabled but the target field is absent or blank.
    Nothing,
}

/// Applies [`MergeOptions`] to inbound messages.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    options: MergeOptions,
}

impl Aggregator {
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    /// Decode a raw message and pull out what should be stored.
    ///
    /// Malformed JSON while merging yields [`BridgeError::Decode`]; callers
    /// treat it as a no-op.
    pub fn extract(&self, raw: &str) -> Result<Extracted> {
        if !self.options.enabled {
            return Ok(Extracted::Replace(Aggregated::from_raw(raw)));
        }

        let Some(target) = self.options.target.as_deref() else {
            return Ok(Extracted::Nothing);
        };

        let doc: Value =
            serde_json::from_str(raw).map_err(|e| BridgeError::Decode(e.to_string()))?;

        Ok(match find_value(&doc, target) {
            Some(value) if !is_blank(value) => Extracted::Merge(value.clone()),
            _ => Extracted::Nothing,
        })
    }

    /// Fold an extracted value into `state`.
    ///
    /// On error `state` is left exactly as it was.
    pub fn commit(&self, state: &mut Option<Aggregated>, extracted: Extracted) -> Result<()> {
        match extracted {
            Extracted::Replace(value) => {
                *state = Some(value);
                Ok(())
            }
            Extracted::Merge(found) => self.merge_into(state, found),
            Extracted::Nothing => Ok(()),
        }
    }

    /// Extract and commit in one step.
    pub fn apply(&self, state: &mut Option<Aggregated>, raw: &str) -> Result<()> {
        let extracted = self.extract(raw)?;
        self.commit(state, extracted)
    }

    fn merge_into(&self, state: &mut Option<Aggregated>, found: Value) -> Result<()> {
        let dedupe_by = self.options.dedupe_by.as_deref();

        match state {
            Some(Aggregated::Json(Value::Array(items))) if !items.is_empty() => {
                let Value::Array(incoming) = found else {
                    return Err(BridgeError::Decode(
                        "cannot append a non-sequence to a sequence".into(),
                    ));
                };
                if let Some(field) = dedupe_by {
                    check_dedupe_shape(&incoming, field)?;
                    items.extend(incoming);
                    dedupe_in_place(items, field);
                } else {
                    items.extend(incoming);
                }
            }
            Some(Aggregated::Json(Value::Object(map))) if !map.is_empty() => {
                let Value::Object(incoming) = found else {
                    return Err(BridgeError::Decode(
                        "cannot merge a non-mapping into a mapping".into(),
                    ));
                };
                map.extend(incoming);
            }
            _ => {
                let mut found = found;
                if let (Value::Array(items), Some(field)) = (&mut found, dedupe_by) {
                    check_dedupe_shape(items, field)?;
                    dedupe_in_place(items, field);
                }
                *state = Some(Aggregated::Json(found));
            }
        }
        Ok(())
    }
}

/// Depth-first search for the first value stored under `target`.
///
/// Mapping keys are visited in document order; a key is matched before its
/// own value is searched. The first matching key ends the search of its
/// mapping: a `null` there counts as absent for that mapping, and the
/// search resumes with the mapping's later siblings.
pub fn find_value<'a>(doc: &'a Value, target: &str) -> Option<&'a Value> {
    match doc {
        Value::Object(map) => {
            for (key, value) in map {
                if key == target {
                    return (!value.is_null()).then_some(value);
                }
                if let Some(found) = find_value(value, target) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|item| find_value(item, target)),
        _ => None,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn check_dedupe_shape(items: &[Value], field: &str) -> Result<()> {
    match items.iter().position(|item| item.get(field).is_none()) {
        Some(index) => Err(BridgeError::Decode(format!(
            "element {index} is not a mapping with field '{field}'"
        ))),
        None => Ok(()),
    }
}

/// Collapse to one entry per distinct `field` value, last write wins.
fn dedupe_in_place(items: &mut Vec<Value>, field: &str) {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut kept: Vec<Value> = Vec::with_capacity(items.len());

    for item in items.drain(..) {
        let marker = item.get(field).map(Value::to_string).unwrap_or_default();
        match slots.get(&marker) {
            Some(&slot) => kept[slot] = item,
            None => {
                slots.insert(marker, kept.len());
                kept.push(item);
            }
        }
    }

    *items = kept;
}
