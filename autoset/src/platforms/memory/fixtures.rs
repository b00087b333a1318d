//! Builders for the settings markup of the target host page.
//!
//! The shapes mirror what the host renders: a heading per setting, a
//! number box paired with a slider, popup selects and ARIA switches, all
//! inside a collapsible run-settings panel.

use super::engine::{ClickBehavior, ElementSpec, MemoryEngine, NodeId};
use crate::utils::format_number;

pub const PAGE_URL: &str = "https://aistudio.google.com/prompts/new_chat";

#[derive(Debug, Clone, Copy)]
pub struct NumericSetting {
    pub container: NodeId,
    pub label: NodeId,
    pub number: NodeId,
    pub range: NodeId,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectSetting {
    pub container: NodeId,
    pub trigger: NodeId,
    pub selected_text: NodeId,
}

#[derive(Debug, Clone, Copy)]
pub struct SwitchSetting {
    pub container: NodeId,
    pub switch: NodeId,
}

#[derive(Debug, Clone, Copy)]
pub struct Panel {
    pub container: NodeId,
    pub toggle: NodeId,
}

/// The run-settings panel plus the toggle button that shows/hides it.
pub fn settings_panel(engine: &MemoryEngine, visible: bool) -> Panel {
    let body = engine.body();
    let toggle = engine.append(
        body,
        ElementSpec::new("button")
            .class("runsettings-toggle-button")
            .attr("aria-label", "Run settings"),
    );
    let mut spec = ElementSpec::new("ms-run-settings").class("run-settings");
    if !visible {
        spec = spec.attr("hidden", "");
    }
    let container = engine.append(body, spec);
    engine.set_click_behavior(toggle, ClickBehavior::ToggleHidden { target: container });
    Panel { container, toggle }
}

/// A slider/number pair under an `h3` title.
pub fn numeric_setting(
    engine: &MemoryEngine,
    parent: NodeId,
    title: &str,
    test_id: Option<&str>,
    value: f64,
    min: f64,
    max: f64,
) -> NumericSetting {
    let mut spec = ElementSpec::new("div").class("settings-item-column");
    if let Some(id) = test_id {
        spec = spec.attr("data-test-id", id);
    }
    let container = engine.append(parent, spec);
    let header = engine.append(container, ElementSpec::new("div").class("settings-header"));
    let label = engine.append(header, ElementSpec::new("h3").text(title));
    let row = engine.append(container, ElementSpec::new("div").class("slider-row"));
    let slider = engine.append(row, ElementSpec::new("mat-slider"));
    let current = format_number(value);
    let range = engine.append(
        slider,
        ElementSpec::new("input")
            .attr("type", "range")
            .attr("min", &format_number(min))
            .attr("max", &format_number(max))
            .attr("step", "0.05")
            .class("mdc-slider__input")
            .value(&current)
            .bound(),
    );
    let wrap = engine.append(row, ElementSpec::new("div").class("number-wrap"));
    let number = engine.append(
        wrap,
        ElementSpec::new("input")
            .attr("type", "number")
            .attr("min", &format_number(min))
            .attr("max", &format_number(max))
            .class("slider-number-input")
            .value(&current)
            .bound(),
    );
    NumericSetting {
        container,
        label,
        number,
        range,
    }
}

/// A popup select showing `current`, offering `options` when clicked.
pub fn select_setting(
    engine: &MemoryEngine,
    parent: NodeId,
    title: &str,
    test_id: Option<&str>,
    current: &str,
    options: &[&str],
) -> SelectSetting {
    let mut spec = ElementSpec::new("div").class("settings-item");
    if let Some(id) = test_id {
        spec = spec.attr("data-test-id", id);
    }
    let container = engine.append(parent, spec);
    engine.append(container, ElementSpec::new("h3").text(title));
    let field = engine.append(container, ElementSpec::new("mat-form-field"));
    let trigger = engine.append(
        field,
        ElementSpec::new("mat-select")
            .attr("role", "combobox")
            .attr("aria-label", title),
    );
    let value = engine.append(trigger, ElementSpec::new("div").class("mat-mdc-select-value"));
    let value_text = engine.append(
        value,
        ElementSpec::new("span").class("mat-mdc-select-value-text"),
    );
    let selected_text = engine.append(value_text, ElementSpec::new("span").text(current));
    engine.set_click_behavior(
        trigger,
        ClickBehavior::OpenOptions {
            options: options.iter().map(|o| o.to_string()).collect(),
            selected_text,
        },
    );
    SelectSetting {
        container,
        trigger,
        selected_text,
    }
}

/// An ARIA switch under an `h3` title.
pub fn switch_setting(
    engine: &MemoryEngine,
    parent: NodeId,
    title: &str,
    checked: bool,
) -> SwitchSetting {
    let container = engine.append(parent, ElementSpec::new("div").class("settings-item"));
    engine.append(container, ElementSpec::new("h3").text(title));
    let toggle = engine.append(container, ElementSpec::new("mat-slide-toggle"));
    let switch = engine.append(
        toggle,
        ElementSpec::new("button")
            .attr("role", "switch")
            .attr("aria-checked", if checked { "true" } else { "false" })
            .class("mdc-switch"),
    );
    engine.set_click_behavior(
        switch,
        ClickBehavior::ToggleAria {
            attribute: "aria-checked".to_string(),
        },
    );
    SwitchSetting { container, switch }
}

/// The chat prompt textarea the page-readiness probe waits for.
pub fn prompt_input(engine: &MemoryEngine) -> NodeId {
    let body = engine.body();
    let wrapper = engine.append(body, ElementSpec::new("ms-autosize-textarea"));
    engine.append(wrapper, ElementSpec::new("textarea").class("textarea"))
}

/// A complete page: prompt input, visible panel, and the three settings
/// the original host shipped with.
#[derive(Debug, Clone)]
pub struct StudioPage {
    pub engine: MemoryEngine,
    pub panel: Panel,
    pub prompt: NodeId,
    pub temperature: NumericSetting,
    pub top_p: NumericSetting,
    pub media_resolution: SelectSetting,
}

impl StudioPage {
    pub fn new() -> Self {
        let engine = MemoryEngine::new(PAGE_URL);
        let prompt = prompt_input(&engine);
        let panel = settings_panel(&engine, true);
        let temperature = numeric_setting(
            &engine,
            panel.container,
            "Temperature",
            Some("temperatureSliderContainer"),
            1.0,
            0.0,
            2.0,
        );
        let top_p = numeric_setting(&engine, panel.container, "Top P", None, 0.95, 0.01, 1.0);
        let media_resolution = select_setting(
            &engine,
            panel.container,
            "Media resolution",
            Some("mediaResolution"),
            "Default",
            &["Default", "Low", "Medium", "High"],
        );
        Self {
            engine,
            panel,
            prompt,
            temperature,
            top_p,
            media_resolution,
        }
    }
}

impl Default for StudioPage {
    fn default() -> Self {
        Self::new()
    }
}
