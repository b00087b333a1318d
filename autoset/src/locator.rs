use tracing::{debug, instrument};

use crate::element::Element;
use crate::errors::AutomationError;
use crate::field::FieldSpec;
use crate::platforms::DomEngine;
use crate::selector::Selector;
use crate::utils::normalize_text;
use std::sync::Arc;

/// How far above a matched label the control search may climb.
pub const MAX_ANCESTOR_DEPTH: usize = 6;

/// One resolution attempt for a field's control, tried in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum LocateStrategy {
    /// The control inside a container identified by a stable attribute,
    /// e.g. `[data-test-id="mediaResolution"]`.
    Structural { container: Selector },
    /// A heading or label whose text equals or contains one of the field's
    /// display names; the control is searched in the label's ancestors.
    LabelText { label: Selector },
    /// A control whose own `aria-label` names the field.
    AriaLabel,
}

impl LocateStrategy {
    pub fn structural(container: impl Into<Selector>) -> Self {
        LocateStrategy::Structural {
            container: container.into(),
        }
    }

    pub fn label(label: impl Into<Selector>) -> Self {
        LocateStrategy::LabelText {
            label: label.into(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LocateStrategy::Structural { .. } => "structural",
            LocateStrategy::LabelText { .. } => "label",
            LocateStrategy::AriaLabel => "aria-label",
        }
    }
}

/// A resolved control and the subtree it was found in.
#[derive(Debug, Clone)]
pub struct LocatedControl {
    pub control: Element,
    /// The container or ancestor the control was found under, used to find
    /// companion controls of the same setting.
    pub scope: Option<Element>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NameMatch {
    Exact,
    Substring,
}

fn match_name(text: &str, names: &[String]) -> Option<NameMatch> {
    let text = normalize_text(text).to_lowercase();
    if text.is_empty() {
        return None;
    }
    let mut best = None;
    for name in names {
        let name = normalize_text(name).to_lowercase();
        if name.is_empty() {
            continue;
        }
        if text == name {
            return Some(NameMatch::Exact);
        }
        if text.contains(&name) {
            best = Some(NameMatch::Substring);
        }
    }
    best
}

/// Exact matches first, document order within each class.
fn rank_by_name<F>(candidates: Vec<Element>, names: &[String], text_of: F) -> Vec<Element>
where
    F: Fn(&Element) -> Option<String>,
{
    let mut ranked: Vec<(NameMatch, Element)> = candidates
        .into_iter()
        .filter_map(|el| {
            let text = text_of(&el)?;
            match_name(&text, names).map(|m| (m, el))
        })
        .collect();
    ranked.sort_by_key(|(m, _)| *m);
    ranked.into_iter().map(|(_, el)| el).collect()
}

/// Resolves a field's live control from its declared strategies.
#[derive(Clone)]
pub struct ElementLocator {
    engine: Arc<dyn DomEngine>,
}

impl ElementLocator {
    pub fn new(engine: Arc<dyn DomEngine>) -> Self {
        Self { engine }
    }

    /// Try every strategy of `field` in order. `Ok(None)` when all of them
    /// exhaust; errors only come from evaluating a strategy.
    #[instrument(level = "trace", skip(self, field), fields(key = %field.key))]
    pub fn locate(&self, field: &FieldSpec) -> Result<Option<LocatedControl>, AutomationError> {
        let control = field.kind.control_selector();
        for strategy in &field.strategies {
            let found = match strategy {
                LocateStrategy::Structural { container } => {
                    self.by_container(container, control)?
                }
                LocateStrategy::LabelText { label } => {
                    self.by_label(label, control, &field.display_names)?
                }
                LocateStrategy::AriaLabel => self.by_aria_label(control, &field.display_names)?,
            };
            if let Some(located) = found {
                debug!(
                    key = %field.key,
                    strategy = strategy.name(),
                    control = ?located.control.summary(),
                    "Located control"
                );
                return Ok(Some(located));
            }
        }
        debug!(key = %field.key, "Control not found by any strategy");
        Ok(None)
    }

    fn by_container(
        &self,
        container: &Selector,
        control: &Selector,
    ) -> Result<Option<LocatedControl>, AutomationError> {
        for scope in self.engine.find_elements(container, None)? {
            if let Some(found) = scope.query_all(control)?.into_iter().find(Element::is_attached) {
                return Ok(Some(LocatedControl {
                    control: found,
                    scope: Some(scope),
                }));
            }
        }
        Ok(None)
    }

    /// The walk stops at the setting boundary: an ancestor that also holds
    /// another heading spans more than one setting, so a control found
    /// there may belong to a neighbour.
    fn by_label(
        &self,
        heading: &Selector,
        control: &Selector,
        names: &[String],
    ) -> Result<Option<LocatedControl>, AutomationError> {
        let labels = self.engine.find_elements(heading, None)?;
        let labels = rank_by_name(labels, names, |el| Some(el.text_content()));
        for label in labels {
            for ancestor in label.ancestors(MAX_ANCESTOR_DEPTH)? {
                if ancestor.query_all(heading)?.iter().any(|other| *other != label) {
                    debug!(label = %label.text_content(), "Reached a shared container");
                    break;
                }
                if let Some(found) = ancestor
                    .query_all(control)?
                    .into_iter()
                    .find(Element::is_attached)
                {
                    return Ok(Some(LocatedControl {
                        control: found,
                        scope: Some(ancestor),
                    }));
                }
            }
        }
        Ok(None)
    }

    fn by_aria_label(
        &self,
        control: &Selector,
        names: &[String],
    ) -> Result<Option<LocatedControl>, AutomationError> {
        let candidates = self.engine.find_elements(control, None)?;
        let ranked = rank_by_name(candidates, names, |el| el.attribute("aria-label"));
        Ok(ranked
            .into_iter()
            .find(Element::is_attached)
            .map(|control| LocatedControl {
                scope: None,
                control,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldKind, FieldValue, NumericControl, SelectControl};
    use crate::platforms::memory::{fixtures, ElementSpec, MemoryEngine};

    fn numeric_field(names: &[&str], strategies: Vec<LocateStrategy>) -> FieldSpec {
        let mut spec = FieldSpec::new(
            "topP",
            names[0],
            FieldKind::NumericInput(NumericControl::new(r#"input[type="number"]"#, 0.001)),
            FieldValue::Number(0.0),
        )
        .display_names(names.iter().copied());
        spec.strategies = strategies;
        spec
    }

    #[test]
    fn label_strategy_walks_up_to_the_setting_container() {
        let page = fixtures::StudioPage::new();
        let locator = ElementLocator::new(Arc::new(page.engine.clone()));
        let field = numeric_field(&["Top-P", "Top P"], vec![LocateStrategy::label("h3")]);

        let located = locator.locate(&field).unwrap().unwrap();
        assert_eq!(
            MemoryEngine::node_id(&located.control),
            Some(page.top_p.number)
        );
        assert_eq!(
            located.scope.as_ref().and_then(MemoryEngine::node_id),
            Some(page.top_p.container)
        );
    }

    #[test]
    fn exact_label_beats_an_earlier_substring_match() {
        let engine = MemoryEngine::new(fixtures::PAGE_URL);
        let panel = fixtures::settings_panel(&engine, true);
        let decoy = fixtures::numeric_setting(
            &engine,
            panel.container,
            "Top P (nucleus)",
            None,
            0.5,
            0.0,
            1.0,
        );
        let wanted = fixtures::numeric_setting(&engine, panel.container, "Top P", None, 0.9, 0.0, 1.0);
        let locator = ElementLocator::new(Arc::new(engine.clone()));

        let located = locator
            .locate(&numeric_field(&["Top P"], vec![LocateStrategy::label("h3")]))
            .unwrap()
            .unwrap();
        assert_ne!(MemoryEngine::node_id(&located.control), Some(decoy.number));
        assert_eq!(MemoryEngine::node_id(&located.control), Some(wanted.number));
    }

    #[test]
    fn ancestor_walk_is_capped() {
        let engine = MemoryEngine::new(fixtures::PAGE_URL);
        let outer = engine.append(engine.body(), ElementSpec::new("section"));
        engine.append(
            outer,
            ElementSpec::new("input").attr("type", "number").value("1"),
        );
        let mut parent = outer;
        for _ in 0..MAX_ANCESTOR_DEPTH {
            parent = engine.append(parent, ElementSpec::new("div"));
        }
        engine.append(parent, ElementSpec::new("h3").text("Top P"));
        let locator = ElementLocator::new(Arc::new(engine.clone()));

        let field = numeric_field(&["Top P"], vec![LocateStrategy::label("h3")]);
        assert!(locator.locate(&field).unwrap().is_none());
    }

    #[test]
    fn label_walk_does_not_cross_into_a_neighbouring_setting() {
        let engine = MemoryEngine::new(fixtures::PAGE_URL);
        let panel = fixtures::settings_panel(&engine, true);
        fixtures::numeric_setting(&engine, panel.container, "Temperature", None, 1.0, 0.0, 2.0);
        let bare = engine.append(panel.container, ElementSpec::new("div").class("settings-item-column"));
        engine.append(bare, ElementSpec::new("h3").text("Top P"));
        let locator = ElementLocator::new(Arc::new(engine.clone()));

        let field = numeric_field(&["Top P"], vec![LocateStrategy::label("h3")]);
        assert!(locator.locate(&field).unwrap().is_none());
    }

    #[test]
    fn strategies_fall_through_in_order() {
        let page = fixtures::StudioPage::new();
        let locator = ElementLocator::new(Arc::new(page.engine.clone()));
        let field = FieldSpec::new(
            "mediaResolution",
            "Media resolution",
            FieldKind::SingleSelect(SelectControl {
                trigger: "mat-select".into(),
                selected_text: ".mat-mdc-select-value-text span".into(),
                option: "mat-option".into(),
                option_text: Some(".mdc-list-item__primary-text".into()),
                backdrop: ".cdk-overlay-backdrop".into(),
            }),
            FieldValue::Choice("Low".into()),
        )
        .strategy(LocateStrategy::structural(r#"[data-test-id="missing"]"#))
        .strategy(LocateStrategy::AriaLabel);

        let located = locator.locate(&field).unwrap().unwrap();
        assert_eq!(
            MemoryEngine::node_id(&located.control),
            Some(page.media_resolution.trigger)
        );
        assert!(located.scope.is_none());
    }

    #[test]
    fn invalid_selectors_surface_as_errors() {
        let page = fixtures::StudioPage::new();
        let locator = ElementLocator::new(Arc::new(page.engine.clone()));
        let field = numeric_field(&["Top P"], vec![LocateStrategy::structural("[unclosed")]);
        assert!(matches!(
            locator.locate(&field),
            Err(AutomationError::InvalidSelector(_))
        ));
    }
}
