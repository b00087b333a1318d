//! Arena-backed reactive document.

pub mod element;
pub mod engine;
pub mod fixtures;

pub use element::MemoryElement;
pub use engine::{ClickBehavior, DomAction, ElementSpec, MemoryEngine, NodeId};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::DomEvent;
    use crate::platforms::DomEngine;
    use crate::Selector;

    #[test]
    fn instance_writes_are_swallowed_by_bound_controls() {
        let engine = MemoryEngine::new("https://host.test/");
        let input = engine.append(
            engine.body(),
            ElementSpec::new("input")
                .attr("type", "number")
                .value("1")
                .bound(),
        );
        let element = engine.element(input);

        element.set_value("0.5").unwrap();
        assert_eq!(element.value().unwrap(), "1");

        element.set_value_via_prototype("0.5").unwrap();
        // without an input event the framework re-renders its model on blur
        element.dispatch_event(&DomEvent::blur()).unwrap();
        assert_eq!(element.value().unwrap(), "1");

        element.set_value_via_prototype("0.5").unwrap();
        element.dispatch_event(&DomEvent::input()).unwrap();
        element.dispatch_event(&DomEvent::blur()).unwrap();
        assert_eq!(element.value().unwrap(), "0.5");
    }

    #[test]
    fn committed_numbers_clamp_to_min() {
        let engine = MemoryEngine::new("https://host.test/");
        let input = engine.append(
            engine.body(),
            ElementSpec::new("input")
                .attr("type", "number")
                .attr("min", "0.01")
                .value("0.95")
                .bound(),
        );
        let element = engine.element(input);
        element.set_value_via_prototype("0").unwrap();
        element.dispatch_event(&DomEvent::input()).unwrap();
        assert_eq!(element.value().unwrap(), "0.01");
    }

    #[test]
    fn popup_select_mounts_and_unmounts_options() {
        let page = fixtures::StudioPage::new();
        let engine = &page.engine;
        engine.element(page.media_resolution.trigger).click().unwrap();

        let options = engine
            .find_elements(&Selector::from("mat-option"), None)
            .unwrap();
        assert_eq!(options.len(), 4);
        options[1].click().unwrap();

        assert_eq!(engine.text_of(page.media_resolution.selected_text), "Low");
        assert!(engine
            .find_elements(&Selector::from("mat-option"), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn hidden_ancestors_hide_descendants() {
        let engine = MemoryEngine::new("https://host.test/");
        let panel = fixtures::settings_panel(&engine, false);
        let setting = fixtures::numeric_setting(
            &engine,
            panel.container,
            "Temperature",
            None,
            1.0,
            0.0,
            2.0,
        );
        assert!(engine.is_node_attached(setting.number));
        assert!(!engine.is_node_visible(setting.number));

        engine.element(panel.toggle).click().unwrap();
        assert!(engine.is_node_visible(setting.number));
    }

    #[test]
    fn detached_handles_refuse_writes() {
        let page = fixtures::StudioPage::new();
        let number = page.engine.element(page.temperature.number);
        page.engine.detach(page.temperature.container);
        assert!(!number.is_attached());
        assert!(matches!(
            number.set_value_via_prototype("0.7"),
            Err(crate::AutomationError::ElementDetached(_))
        ));
    }
}
