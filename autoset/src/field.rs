//! Static descriptors of the settings the agent controls.

use crate::locator::LocateStrategy;
use crate::utils::{normalize_text, parse_number, within_tolerance};
use crate::{AutomationError, Element, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A setting value in its semantic type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Toggle(bool),
    Number(f64),
    Choice(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Toggle(b) => write!(f, "{}", if *b { "on" } else { "off" }),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Choice(c) => write!(f, "{c}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlKind {
    NumericInput,
    SingleSelect,
    BinarySwitch,
}

/// A number box, optionally mirrored by a slider bound to the same value.
#[derive(Debug, Clone)]
pub struct NumericControl {
    pub input: Selector,
    pub companion: Option<Selector>,
    pub tolerance: f64,
    /// Lower the `min` attribute when the target lies below it; the host
    /// clamps committed values to `min` otherwise.
    pub relax_min: bool,
}

impl NumericControl {
    pub fn new(input: impl Into<Selector>, tolerance: f64) -> Self {
        Self {
            input: input.into(),
            companion: None,
            tolerance,
            relax_min: false,
        }
    }

    pub fn with_companion(mut self, companion: impl Into<Selector>) -> Self {
        self.companion = Some(companion.into());
        self
    }

    pub fn relaxing_min(mut self) -> Self {
        self.relax_min = true;
        self
    }
}

/// A popup-driven select widget (not a native `<select>`).
#[derive(Debug, Clone)]
pub struct SelectControl {
    pub trigger: Selector,
    /// Where the trigger renders the current choice, relative to the trigger.
    pub selected_text: Selector,
    /// Options mounted in the popup panel, searched document-wide.
    pub option: Selector,
    /// Text node inside an option; the whole option text when `None`.
    pub option_text: Option<Selector>,
    /// Region to click to dismiss the popup without choosing.
    pub backdrop: Selector,
}

/// A switch whose state lives in an ARIA attribute.
#[derive(Debug, Clone)]
pub struct SwitchControl {
    pub switch: Selector,
    pub state_attribute: String,
}

impl SwitchControl {
    pub fn new(switch: impl Into<Selector>) -> Self {
        Self {
            switch: switch.into(),
            state_attribute: "aria-checked".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    NumericInput(NumericControl),
    SingleSelect(SelectControl),
    BinarySwitch(SwitchControl),
}

impl FieldKind {
    pub fn control_kind(&self) -> ControlKind {
        match self {
            FieldKind::NumericInput(_) => ControlKind::NumericInput,
            FieldKind::SingleSelect(_) => ControlKind::SingleSelect,
            FieldKind::BinarySwitch(_) => ControlKind::BinarySwitch,
        }
    }

    /// Selector of the element the locator must resolve to.
    pub fn control_selector(&self) -> &Selector {
        match self {
            FieldKind::NumericInput(c) => &c.input,
            FieldKind::SingleSelect(c) => &c.trigger,
            FieldKind::BinarySwitch(c) => &c.switch,
        }
    }

    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (FieldKind::NumericInput(_), FieldValue::Number(_))
                | (FieldKind::SingleSelect(_), FieldValue::Choice(_))
                | (FieldKind::BinarySwitch(_), FieldValue::Toggle(_))
        )
    }
}

/// Static descriptor of one controllable setting.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    /// Every heading text the host has used for this setting.
    pub display_names: Vec<String>,
    pub strategies: Vec<LocateStrategy>,
    pub kind: FieldKind,
    pub default: FieldValue,
}

impl FieldSpec {
    pub fn new(key: &str, label: &str, kind: FieldKind, default: FieldValue) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            display_names: vec![label.to_string()],
            strategies: Vec::new(),
            kind,
            default,
        }
    }

    pub fn display_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.display_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn strategy(mut self, strategy: LocateStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn control_kind(&self) -> ControlKind {
        self.kind.control_kind()
    }

    pub fn tolerance(&self) -> f64 {
        match &self.kind {
            FieldKind::NumericInput(c) => c.tolerance,
            _ => 0.0,
        }
    }

    /// Read the control's current value. `None` when the control renders
    /// nothing interpretable (empty box, no selection, no ARIA state).
    pub fn read(&self, handle: &Element) -> Result<Option<FieldValue>, AutomationError> {
        match &self.kind {
            FieldKind::NumericInput(_) => {
                Ok(parse_number(&handle.value()?).map(FieldValue::Number))
            }
            FieldKind::SingleSelect(control) => {
                let text = match handle.query(&control.selected_text)? {
                    Some(node) => node.text_content(),
                    None => handle.text_content(),
                };
                let text = normalize_text(&text);
                Ok((!text.is_empty()).then_some(FieldValue::Choice(text)))
            }
            FieldKind::BinarySwitch(control) => Ok(handle
                .aria_state(&control.state_attribute)
                .map(FieldValue::Toggle)),
        }
    }

    /// Whether `current` satisfies `desired` for this field.
    pub fn matches(&self, current: &FieldValue, desired: &FieldValue) -> bool {
        match (current, desired) {
            (FieldValue::Number(a), FieldValue::Number(b)) => {
                within_tolerance(*a, *b, self.tolerance())
            }
            (FieldValue::Choice(a), FieldValue::Choice(b)) => {
                normalize_text(a).eq_ignore_ascii_case(&normalize_text(b))
            }
            (FieldValue::Toggle(a), FieldValue::Toggle(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_values_deserialize_untagged() {
        let values: Vec<FieldValue> = serde_json::from_str(r#"[true, 0.7, "Low"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                FieldValue::Toggle(true),
                FieldValue::Number(0.7),
                FieldValue::Choice("Low".to_string()),
            ]
        );
    }

    #[test]
    fn numeric_matching_uses_tolerance() {
        let spec = FieldSpec::new(
            "topP",
            "Top P",
            FieldKind::NumericInput(NumericControl::new("input", 0.001)),
            FieldValue::Number(0.0),
        );
        assert!(spec.matches(&FieldValue::Number(0.0003), &FieldValue::Number(0.0)));
        assert!(!spec.matches(&FieldValue::Number(0.01), &FieldValue::Number(0.0)));
        assert!(!spec.matches(&FieldValue::Choice("0".into()), &FieldValue::Number(0.0)));
    }

    #[test]
    fn kinds_accept_only_their_value_type() {
        let kind = FieldKind::BinarySwitch(SwitchControl::new("button"));
        assert!(kind.accepts(&FieldValue::Toggle(false)));
        assert!(!kind.accepts(&FieldValue::Number(1.0)));
    }
}
