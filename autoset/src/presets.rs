//! Field catalogue of the AI Studio prompt page.

use crate::field::{
    FieldKind, FieldSpec, FieldValue, NumericControl, SelectControl, SwitchControl,
};
use crate::locator::LocateStrategy;
use crate::page::PageSpec;
use crate::panel::PanelSpec;

const HEADING: &str = "h3";
const NUMBER_INPUT: &str = r#"input[type="number"]"#;
const RANGE_INPUT: &str = r#"input[type="range"]"#;
const SWITCH: &str = r#"button[role="switch"]"#;
const PROMPT_INPUT: &str = "ms-autosize-textarea textarea.textarea";

/// Numeric settings read back within this distance of the target.
pub const NUMERIC_TOLERANCE: f64 = 0.001;

fn popup_select() -> SelectControl {
    SelectControl {
        trigger: "mat-select".into(),
        selected_text: ".mat-mdc-select-value-text span".into(),
        option: "mat-option".into(),
        option_text: Some(".mdc-list-item__primary-text".into()),
        backdrop: ".cdk-overlay-backdrop".into(),
    }
}

pub fn temperature() -> FieldSpec {
    FieldSpec::new(
        "temperature",
        "Temperature",
        FieldKind::NumericInput(
            NumericControl::new(NUMBER_INPUT, NUMERIC_TOLERANCE).with_companion(RANGE_INPUT),
        ),
        FieldValue::Number(0.7),
    )
    .strategy(LocateStrategy::structural(
        r#"[data-test-id="temperatureSliderContainer"]"#,
    ))
    .strategy(LocateStrategy::label(HEADING))
}

/// The host enforces a positive minimum on this slider; zero needs the
/// constraint lowered first.
pub fn top_p() -> FieldSpec {
    FieldSpec::new(
        "topP",
        "Top P",
        FieldKind::NumericInput(
            NumericControl::new(NUMBER_INPUT, NUMERIC_TOLERANCE)
                .with_companion(RANGE_INPUT)
                .relaxing_min(),
        ),
        FieldValue::Number(0.0),
    )
    .display_names(["Top P", "Top-P"])
    .strategy(LocateStrategy::label(HEADING))
}

pub fn media_resolution() -> FieldSpec {
    FieldSpec::new(
        "mediaResolution",
        "Media resolution",
        FieldKind::SingleSelect(popup_select()),
        FieldValue::Choice("Low".to_string()),
    )
    .strategy(LocateStrategy::structural(r#"[data-test-id="mediaResolution"]"#))
    .strategy(LocateStrategy::label(HEADING))
    .strategy(LocateStrategy::AriaLabel)
}

pub fn thinking_level() -> FieldSpec {
    FieldSpec::new(
        "thinkingLevel",
        "Thinking level",
        FieldKind::SingleSelect(popup_select()),
        FieldValue::Choice("High".to_string()),
    )
    .strategy(LocateStrategy::structural(r#"[data-test-id="thinkingLevel"]"#))
    .strategy(LocateStrategy::AriaLabel)
    .strategy(LocateStrategy::label(HEADING))
}

pub fn google_search() -> FieldSpec {
    FieldSpec::new(
        "googleSearch",
        "Grounding with Google Search",
        FieldKind::BinarySwitch(SwitchControl::new(SWITCH)),
        FieldValue::Toggle(false),
    )
    .display_names(["Grounding with Google Search", "Google Search"])
    .strategy(LocateStrategy::label(HEADING))
}

pub fn url_context() -> FieldSpec {
    FieldSpec::new(
        "urlContext",
        "URL context",
        FieldKind::BinarySwitch(SwitchControl::new(SWITCH)),
        FieldValue::Toggle(false),
    )
    .strategy(LocateStrategy::label(HEADING))
}

/// The default field set, in sweep order.
pub fn catalogue() -> Vec<FieldSpec> {
    vec![temperature(), top_p(), media_resolution()]
}

/// The default set plus the model-dependent tool and reasoning settings,
/// which only render for some models.
pub fn extended_catalogue() -> Vec<FieldSpec> {
    let mut fields = catalogue();
    fields.extend([thinking_level(), google_search(), url_context()]);
    fields
}

pub fn run_settings_panel() -> PanelSpec {
    PanelSpec {
        container: "ms-run-settings".into(),
        toggle: "button.runsettings-toggle-button".into(),
    }
}

pub fn studio_page() -> PageSpec {
    PageSpec {
        ready_selectors: vec![PROMPT_INPUT.into(), HEADING.into()],
        focus_target: Some(PROMPT_INPUT.into()),
    }
}
