//! Framework-safe writes into native form controls.
//!
//! Frameworks that bind a form control intercept the instance-level `value`
//! setter and ignore (or overwrite) direct assignments. Writes therefore go
//! through the prototype-level accessor and are announced with the same
//! bubbling `input`, `change`, `blur` sequence a user edit produces.

use crate::config::AgentSettings;
use crate::element::{DomEvent, Element};
use crate::errors::AutomationError;
use crate::field::{FieldKind, FieldSpec, FieldValue, NumericControl, SelectControl, SwitchControl};
use crate::locator::LocatedControl;
use crate::platforms::DomEngine;
use crate::utils::{format_number, normalize_text, parse_number};
use crate::wait::{sleep_or_cancel, wait_for, WaitOptions, WaitOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Levels above a numeric control searched for its companion slider when
/// the locator reported no scope.
const COMPANION_SEARCH_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectorTimings {
    /// Bound on the wait for a popup select's option panel.
    pub option_panel_timeout: Duration,
    pub poll_interval: Duration,
    /// Pause after choosing an option, letting the popup unmount.
    pub settle_delay: Duration,
}

impl Default for InjectorTimings {
    fn default() -> Self {
        Self {
            option_panel_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(50),
            settle_delay: Duration::from_millis(100),
        }
    }
}

impl From<&AgentSettings> for InjectorTimings {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            option_panel_timeout: settings.option_panel_timeout(),
            poll_interval: settings.wait_poll_interval(),
            settle_delay: settings.settle_delay(),
        }
    }
}

/// Write `text` the way a user edit would reach the framework.
pub fn write_native(element: &Element, text: &str) -> Result<(), AutomationError> {
    element.set_value_via_prototype(text)?;
    element.dispatch_event(&DomEvent::input())?;
    element.dispatch_event(&DomEvent::change())?;
    element.dispatch_event(&DomEvent::blur())?;
    Ok(())
}

pub struct ValueInjector {
    engine: Arc<dyn DomEngine>,
    timings: InjectorTimings,
}

impl ValueInjector {
    pub fn new(engine: Arc<dyn DomEngine>, timings: InjectorTimings) -> Self {
        Self { engine, timings }
    }

    /// Drive the located control toward `value`.
    ///
    /// `Ok(false)` when the control is disabled, even if it already shows
    /// the value. Otherwise `Ok(true)` when it already holds the value or
    /// the write sequence completed, and `Ok(false)` when the requested
    /// option does not exist or the wait was cut short. Success
    /// here is not confirmation: callers re-read the control.
    #[instrument(level = "debug", skip(self, field, located, cancel), fields(key = %field.key))]
    pub async fn set_native_value(
        &self,
        field: &FieldSpec,
        located: &LocatedControl,
        value: &FieldValue,
        cancel: &CancellationToken,
    ) -> Result<bool, AutomationError> {
        if !field.kind.accepts(value) {
            return Err(AutomationError::InvalidArgument(format!(
                "value {value} does not fit a {:?} control",
                field.control_kind()
            )));
        }
        let handle = &located.control;
        if !handle.is_enabled()? {
            debug!(key = %field.key, "Control disabled, not writing");
            return Ok(false);
        }
        if let Some(current) = field.read(handle)? {
            if field.matches(&current, value) {
                debug!(key = %field.key, %current, "Already at desired value, no write");
                return Ok(true);
            }
        }

        let written = match (&field.kind, value) {
            (FieldKind::NumericInput(control), FieldValue::Number(target)) => {
                self.write_numeric(control, located, *target)?
            }
            (FieldKind::SingleSelect(control), FieldValue::Choice(choice)) => {
                self.choose_option(control, handle, choice, cancel).await?
            }
            (FieldKind::BinarySwitch(control), FieldValue::Toggle(on)) => {
                Self::flip_switch(control, handle, *on)?
            }
            _ => false,
        };
        self.await_host(cancel).await;
        Ok(written)
    }

    /// Let writes still travelling to the host land before anyone re-reads.
    async fn await_host(&self, cancel: &CancellationToken) {
        let engine = self.engine.as_ref();
        let options = WaitOptions::new(self.timings.option_panel_timeout, self.timings.poll_interval);
        let outcome = wait_for(engine, options, cancel, || {
            (!engine.has_pending_writes()).then_some(())
        })
        .await;
        if outcome == WaitOutcome::TimedOut {
            warn!("Host did not acknowledge the writes in time");
        }
    }

    fn write_numeric(
        &self,
        control: &NumericControl,
        located: &LocatedControl,
        target: f64,
    ) -> Result<bool, AutomationError> {
        let input = &located.control;
        let text = format_number(target);

        input.click()?;
        if control.relax_min {
            relax_min(input, target)?;
        }
        write_native(input, &text)?;

        if let Some(companion) = self.companion_of(control, located)? {
            if companion.is_enabled()? {
                if let Err(e) = mirror(&companion, control.relax_min, target, &text) {
                    warn!(error = %e, "Companion slider write failed");
                }
            }
        }
        Ok(true)
    }

    fn companion_of(
        &self,
        control: &NumericControl,
        located: &LocatedControl,
    ) -> Result<Option<Element>, AutomationError> {
        let Some(selector) = &control.companion else {
            return Ok(None);
        };
        let scopes = match &located.scope {
            Some(scope) => vec![scope.clone()],
            None => located.control.ancestors(COMPANION_SEARCH_DEPTH)?,
        };
        for scope in scopes {
            if let Some(found) = scope
                .query_all(selector)?
                .into_iter()
                .find(|el| el != &located.control && el.is_attached())
            {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    async fn choose_option(
        &self,
        control: &SelectControl,
        trigger: &Element,
        choice: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, AutomationError> {
        trigger.click()?;

        let engine = self.engine.as_ref();
        let options = WaitOptions::new(self.timings.option_panel_timeout, self.timings.poll_interval);
        let outcome = wait_for(engine, options, cancel, || {
            let found = engine.find_elements(&control.option, None).ok()?;
            let visible = found
                .into_iter()
                .filter(|o| o.is_visible().unwrap_or(false))
                .collect::<Vec<_>>();
            (!visible.is_empty()).then_some(visible)
        })
        .await;

        let available = match outcome {
            WaitOutcome::Found(available) => available,
            WaitOutcome::TimedOut => {
                warn!(choice, "Option panel did not open");
                self.dismiss(control)?;
                return Ok(false);
            }
            WaitOutcome::Cancelled => {
                self.dismiss(control)?;
                return Ok(false);
            }
        };

        let wanted = normalize_text(choice);
        let mut chosen = None;
        for option in available {
            let text = match &control.option_text {
                Some(selector) => option.query(selector)?.map(|t| t.text_content()),
                None => Some(option.text_content()),
            };
            if text.is_some_and(|t| normalize_text(&t).eq_ignore_ascii_case(&wanted)) {
                chosen = Some(option);
                break;
            }
        }

        let Some(option) = chosen else {
            warn!(choice, "No option matches the desired choice");
            self.dismiss(control)?;
            return Ok(false);
        };
        option.click()?;
        sleep_or_cancel(self.timings.settle_delay, cancel).await;
        Ok(true)
    }

    /// Close an open option panel without choosing.
    fn dismiss(&self, control: &SelectControl) -> Result<(), AutomationError> {
        let target = match self.engine.find_element(&control.backdrop, None)? {
            Some(backdrop) => Some(backdrop),
            None => self.engine.find_element(&"body".into(), None)?,
        };
        if let Some(target) = target {
            target.click()?;
        }
        Ok(())
    }

    fn flip_switch(
        control: &SwitchControl,
        switch: &Element,
        on: bool,
    ) -> Result<bool, AutomationError> {
        if switch.aria_state(&control.state_attribute) == Some(on) {
            return Ok(true);
        }
        switch.click()?;
        Ok(true)
    }
}

fn mirror(companion: &Element, relax: bool, target: f64, text: &str) -> Result<(), AutomationError> {
    if relax {
        relax_min(companion, target)?;
    }
    write_native(companion, text)
}

/// Lower the control's `min` attribute when `target` lies below it.
fn relax_min(input: &Element, target: f64) -> Result<(), AutomationError> {
    let min = input.attribute("min").and_then(|m| parse_number(&m));
    if min.is_some_and(|min| target < min) {
        input.set_attribute("min", &format_number(target))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{NumericControl, SwitchControl};
    use crate::platforms::memory::{fixtures, DomAction, MemoryEngine};

    fn injector(engine: &MemoryEngine) -> ValueInjector {
        ValueInjector::new(Arc::new(engine.clone()), InjectorTimings::default())
    }

    fn numeric(relax: bool) -> FieldSpec {
        let mut control = NumericControl::new(r#"input[type="number"]"#, 0.001)
            .with_companion(r#"input[type="range"]"#);
        control.relax_min = relax;
        FieldSpec::new(
            "topP",
            "Top P",
            FieldKind::NumericInput(control),
            FieldValue::Number(0.0),
        )
    }

    fn located(engine: &MemoryEngine, control: fixtures::NumericSetting) -> LocatedControl {
        LocatedControl {
            control: engine.element(control.number),
            scope: Some(engine.element(control.container)),
        }
    }

    #[tokio::test]
    async fn numeric_write_uses_the_prototype_path_and_events() {
        let page = fixtures::StudioPage::new();
        let engine = &page.engine;
        let field = numeric(false);
        let ok = injector(engine)
            .set_native_value(
                &field,
                &located(engine, page.temperature),
                &FieldValue::Number(0.7),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(ok);

        let on_number: Vec<DomAction> = engine
            .actions_for(page.temperature.number)
            .into_iter()
            .filter(|a| !matches!(a, DomAction::Click { .. }))
            .collect();
        assert_eq!(
            on_number,
            vec![
                DomAction::PrototypeWrite {
                    node: page.temperature.number,
                    value: "0.7".into()
                },
                DomAction::Event {
                    node: page.temperature.number,
                    kind: "input".into(),
                    bubbles: true
                },
                DomAction::Event {
                    node: page.temperature.number,
                    kind: "change".into(),
                    bubbles: true
                },
                DomAction::Event {
                    node: page.temperature.number,
                    kind: "blur".into(),
                    bubbles: true
                },
            ]
        );
        assert_eq!(engine.value_of(page.temperature.number), "0.7");
        assert_eq!(engine.value_of(page.temperature.range), "0.7");
    }

    #[tokio::test]
    async fn relaxing_min_lets_zero_through() {
        let page = fixtures::StudioPage::new();
        let engine = &page.engine;
        let target = located(engine, page.top_p);

        injector(engine)
            .set_native_value(&numeric(false), &target, &FieldValue::Number(0.0), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(engine.value_of(page.top_p.number), "0.01");

        injector(engine)
            .set_native_value(&numeric(true), &target, &FieldValue::Number(0.0), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(engine.value_of(page.top_p.number), "0");
        assert_eq!(engine.attribute_of(page.top_p.number, "min").as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn disabled_controls_are_never_written() {
        let page = fixtures::StudioPage::new();
        let engine = &page.engine;
        engine.set_host_attribute(page.temperature.number, "disabled", Some(""));
        let ok = injector(engine)
            .set_native_value(
                &numeric(false),
                &located(engine, page.temperature),
                &FieldValue::Number(0.7),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(engine.write_count(), 0);
    }

    #[tokio::test]
    async fn switches_click_only_on_mismatch() {
        let engine = MemoryEngine::new(fixtures::PAGE_URL);
        let panel = fixtures::settings_panel(&engine, true);
        let setting = fixtures::switch_setting(&engine, panel.container, "URL context", false);
        let field = FieldSpec::new(
            "urlContext",
            "URL context",
            FieldKind::BinarySwitch(SwitchControl::new(r#"button[role="switch"]"#)),
            FieldValue::Toggle(false),
        );
        let target = LocatedControl {
            control: engine.element(setting.switch),
            scope: None,
        };
        let inj = injector(&engine);
        let cancel = CancellationToken::new();

        assert!(inj
            .set_native_value(&field, &target, &FieldValue::Toggle(false), &cancel)
            .await
            .unwrap());
        assert_eq!(engine.click_count(setting.switch), 0);

        assert!(inj
            .set_native_value(&field, &target, &FieldValue::Toggle(true), &cancel)
            .await
            .unwrap());
        assert_eq!(engine.click_count(setting.switch), 1);
        assert_eq!(
            engine.attribute_of(setting.switch, "aria-checked").as_deref(),
            Some("true")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_option_dismisses_the_popup() {
        let page = fixtures::StudioPage::new();
        let engine = &page.engine;
        let field = crate::presets::media_resolution();
        let target = LocatedControl {
            control: engine.element(page.media_resolution.trigger),
            scope: None,
        };
        let ok = injector(engine)
            .set_native_value(
                &field,
                &target,
                &FieldValue::Choice("Ultra".into()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(engine.text_of(page.media_resolution.selected_text), "Default");
        assert!(engine
            .find_elements(&"mat-option".into(), None)
            .unwrap()
            .is_empty());
    }
}
