use super::{applier_for, init_tracing, shared};
use crate::applier::{FieldOutcome, Miss};
use crate::element::Element;
use crate::errors::AutomationError;
use crate::field::FieldValue;
use crate::platforms::memory::{fixtures, DomAction, ElementSpec, MemoryEngine};
use crate::platforms::DomEngine;
use crate::presets;
use crate::selector::Selector;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn prototype_writes(engine: &MemoryEngine, node: crate::platforms::memory::NodeId) -> usize {
    engine
        .actions_for(node)
        .iter()
        .filter(|a| matches!(a, DomAction::PrototypeWrite { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn second_application_performs_no_writes() {
    init_tracing();
    let page = fixtures::StudioPage::new();
    let applier = applier_for(shared(&page.engine));
    let cancel = CancellationToken::new();
    let field = presets::temperature();
    let desired = FieldValue::Number(0.7);

    assert_eq!(
        applier.apply(&field, &desired, &cancel).await,
        FieldOutcome::Converged
    );
    assert_eq!(prototype_writes(&page.engine, page.temperature.number), 1);

    page.engine.clear_actions();
    assert_eq!(
        applier.apply(&field, &desired, &cancel).await,
        FieldOutcome::Converged
    );
    assert_eq!(page.engine.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn values_within_tolerance_count_as_converged() {
    let page = fixtures::StudioPage::new();
    page.engine.set_host_value(page.top_p.number, "0.0003");
    let applier = applier_for(shared(&page.engine));

    let outcome = applier
        .apply(
            &presets::top_p(),
            &FieldValue::Number(0.0),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, FieldOutcome::Converged);
    assert_eq!(page.engine.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn top_p_reaches_zero_below_the_host_minimum() {
    let page = fixtures::StudioPage::new();
    let applier = applier_for(shared(&page.engine));

    let outcome = applier
        .apply(
            &presets::top_p(),
            &FieldValue::Number(0.0),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, FieldOutcome::Converged);
    assert_eq!(page.engine.value_of(page.top_p.number), "0");
    assert_eq!(page.engine.value_of(page.top_p.range), "0");
}

#[tokio::test(start_paused = true)]
async fn disabled_number_input_is_unreachable_even_when_matching() {
    let page = fixtures::StudioPage::new();
    page.engine.set_host_value(page.temperature.number, "0.7");
    page.engine
        .set_host_attribute(page.temperature.number, "disabled", Some(""));
    let applier = applier_for(shared(&page.engine));

    let outcome = applier
        .apply(
            &presets::temperature(),
            &FieldValue::Number(0.7),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, FieldOutcome::Unreachable(Miss::Disabled));
    assert_eq!(page.engine.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn aria_disabled_select_is_never_opened() {
    let page = fixtures::StudioPage::new();
    page.engine.set_host_attribute(
        page.media_resolution.trigger,
        "aria-disabled",
        Some("true"),
    );
    let applier = applier_for(shared(&page.engine));

    let outcome = applier
        .apply(
            &presets::media_resolution(),
            &FieldValue::Choice("Low".into()),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, FieldOutcome::Unreachable(Miss::Disabled));
    assert_eq!(page.engine.click_count(page.media_resolution.trigger), 0);
    assert_eq!(
        page.engine.text_of(page.media_resolution.selected_text),
        "Default"
    );
}

#[tokio::test(start_paused = true)]
async fn disabled_switch_is_never_clicked() {
    let engine = MemoryEngine::new(fixtures::PAGE_URL);
    let panel = fixtures::settings_panel(&engine, true);
    let setting = fixtures::switch_setting(&engine, panel.container, "URL context", true);
    engine.set_host_attribute(setting.switch, "disabled", Some(""));
    let applier = applier_for(shared(&engine));

    let outcome = applier
        .apply(
            &presets::url_context(),
            &FieldValue::Toggle(false),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, FieldOutcome::Unreachable(Miss::Disabled));
    assert_eq!(engine.click_count(setting.switch), 0);
}

#[tokio::test(start_paused = true)]
async fn popup_select_converges_on_the_requested_option() {
    let page = fixtures::StudioPage::new();
    let applier = applier_for(shared(&page.engine));

    let outcome = applier
        .apply(
            &presets::media_resolution(),
            &FieldValue::Choice("low".into()),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, FieldOutcome::Converged);
    assert_eq!(page.engine.text_of(page.media_resolution.selected_text), "Low");
    assert_eq!(page.engine.click_count(page.media_resolution.trigger), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_commit_is_reported_after_read_back() {
    let page = fixtures::StudioPage::new();
    page.engine.set_rejects_writes(page.temperature.number, true);
    let applier = applier_for(shared(&page.engine));

    let outcome = applier
        .apply(
            &presets::temperature(),
            &FieldValue::Number(0.7),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, FieldOutcome::Unreachable(Miss::WriteRejected));
    assert_eq!(prototype_writes(&page.engine, page.temperature.number), 1);
    assert_eq!(page.engine.value_of(page.temperature.number), "1");
}

#[tokio::test(start_paused = true)]
async fn absent_control_is_not_found() {
    let page = fixtures::StudioPage::new();
    page.engine.detach(page.temperature.container);
    let applier = applier_for(shared(&page.engine));

    let outcome = applier
        .apply(
            &presets::temperature(),
            &FieldValue::Number(0.7),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, FieldOutcome::Unreachable(Miss::NotFound));
    assert_eq!(page.engine.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn heading_without_a_control_never_borrows_a_neighbours_input() {
    let engine = MemoryEngine::new(fixtures::PAGE_URL);
    let panel = fixtures::settings_panel(&engine, true);
    let temperature =
        fixtures::numeric_setting(&engine, panel.container, "Temperature", None, 1.0, 0.0, 2.0);
    let bare = engine.append(
        panel.container,
        ElementSpec::new("div").class("settings-item-column"),
    );
    engine.append(bare, ElementSpec::new("h3").text("Top P"));
    let applier = applier_for(shared(&engine));

    let outcome = applier
        .apply(
            &presets::top_p(),
            &FieldValue::Number(0.0),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, FieldOutcome::Unreachable(Miss::NotFound));
    assert_eq!(engine.value_of(temperature.number), "1");
    assert_eq!(engine.value_of(temperature.range), "1");
    assert_eq!(engine.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn mistyped_value_is_rejected_without_touching_the_page() {
    let page = fixtures::StudioPage::new();
    let applier = applier_for(shared(&page.engine));

    let outcome = applier
        .apply(
            &presets::temperature(),
            &FieldValue::Choice("hot".into()),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(outcome, FieldOutcome::Unreachable(Miss::WriteRejected));
    assert!(page.engine.actions().is_empty());
}

/// Delegates to a memory document but panics on one selector.
pub(super) struct ExplodingEngine {
    pub inner: MemoryEngine,
    pub trigger: Selector,
}

impl DomEngine for ExplodingEngine {
    fn document(&self) -> Element {
        self.inner.document()
    }

    fn page_url(&self) -> String {
        self.inner.page_url()
    }

    fn mutation_signal(&self) -> Option<Arc<Notify>> {
        self.inner.mutation_signal()
    }

    fn find_elements(
        &self,
        selector: &Selector,
        root: Option<&Element>,
    ) -> Result<Vec<Element>, AutomationError> {
        if *selector == self.trigger {
            panic!("renderer crashed while resolving {selector}");
        }
        self.inner.find_elements(selector, root)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[tokio::test(start_paused = true)]
async fn panics_become_faults_of_that_field() {
    let page = fixtures::StudioPage::new();
    let engine: Arc<dyn DomEngine> = Arc::new(ExplodingEngine {
        inner: page.engine.clone(),
        trigger: Selector::from(r#"[data-test-id="mediaResolution"]"#),
    });
    let applier = applier_for(engine);
    let cancel = CancellationToken::new();

    let outcome = applier
        .apply(
            &presets::media_resolution(),
            &FieldValue::Choice("Low".into()),
            &cancel,
        )
        .await;
    match outcome {
        FieldOutcome::Unreachable(Miss::Fault(message)) => {
            assert!(message.contains("renderer crashed"), "{message}");
        }
        other => panic!("expected a fault, got {other:?}"),
    }

    // the same applier keeps working for other fields
    assert_eq!(
        applier
            .apply(&presets::temperature(), &FieldValue::Number(0.7), &cancel)
            .await,
        FieldOutcome::Converged
    );
}
