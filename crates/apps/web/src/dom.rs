//! Page bindings: control events feed the state machine, and [`render`]
//! rewrites the page from a state snapshot.
//!
//! Expected markup:
//! - `#resolution-dropdown` select
//! - `input.year-option` / `input.state-option` checkboxes, value = filter value
//! - `#generate-map-btn` button (generate or reset)
//! - `#filter-panel`, `#map-container`, `#loading-indicator`, `#error-message`

use protocol::KNOWN_RESOLUTIONS;
use selection::{Event, SelectionState};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    Document, HtmlButtonElement, HtmlElement, HtmlIFrameElement, HtmlInputElement,
    HtmlSelectElement,
};

use crate::dispatch;

const RESOLUTION_ID: &str = "resolution-dropdown";
const TRIGGER_ID: &str = "generate-map-btn";
const FILTER_PANEL_ID: &str = "filter-panel";
const MAP_CONTAINER_ID: &str = "map-container";
const LOADING_ID: &str = "loading-indicator";
const ERROR_ID: &str = "error-message";
const YEAR_CLASS: &str = "year-option";
const STATE_CLASS: &str = "state-option";

fn document() -> Result<Document, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))
}

fn element<T: JsCast>(document: &Document, id: &str) -> Result<Option<T>, JsValue> {
    match document.get_element_by_id(id) {
        Some(el) => Ok(Some(el.dyn_into::<T>()?)),
        None => Ok(None),
    }
}

fn inputs_with_class(document: &Document, class: &str) -> Vec<HtmlInputElement> {
    let collection = document.get_elements_by_class_name(class);
    (0..collection.length())
        .filter_map(|i| collection.item(i))
        .filter_map(|el| el.dyn_into::<HtmlInputElement>().ok())
        .collect()
}

fn listen(
    target: &web_sys::EventTarget,
    kind: &str,
    mut handler: impl FnMut() + 'static,
) -> Result<(), JsValue> {
    let closure =
        Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| handler());
    target.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref())?;
    // Listeners live as long as the page.
    closure.forget();
    Ok(())
}

pub fn bind_controls() -> Result<(), JsValue> {
    let document = document()?;

    if let Some(select) = element::<HtmlSelectElement>(&document, RESOLUTION_ID)? {
        populate_resolutions(&document, &select)?;
        let source = select.clone();
        listen(&select, "change", move || {
            let value = source.value();
            dispatch(Event::SetResolution(Some(value)));
        })?;
    }

    for input in inputs_with_class(&document, YEAR_CLASS) {
        let source = input.clone();
        listen(&input, "change", move || {
            dispatch(Event::ToggleYear(source.value()));
        })?;
    }

    for input in inputs_with_class(&document, STATE_CLASS) {
        let source = input.clone();
        listen(&input, "change", move || {
            dispatch(Event::ToggleState(source.value()));
        })?;
    }

    if let Some(button) = element::<HtmlButtonElement>(&document, TRIGGER_ID)? {
        listen(&button, "click", || dispatch(Event::TriggerPressed))?;
    }

    Ok(())
}

/// Fills an empty resolution dropdown with a placeholder and the known values.
fn populate_resolutions(document: &Document, select: &HtmlSelectElement) -> Result<(), JsValue> {
    if select.length() > 0 {
        return Ok(());
    }
    let placeholder = document.create_element("option")?;
    placeholder.set_attribute("value", "")?;
    placeholder.set_text_content(Some("Select resolution"));
    select.append_child(&placeholder)?;
    for resolution in KNOWN_RESOLUTIONS {
        let option = document.create_element("option")?;
        option.set_attribute("value", resolution)?;
        option.set_text_content(Some(resolution));
        select.append_child(&option)?;
    }
    Ok(())
}

/// Rewrites every bound control from `state`.
pub fn render(state: &SelectionState) -> Result<(), JsValue> {
    let document = document()?;
    let editable = state.filters_visible() && !state.is_loading();

    if let Some(select) = element::<HtmlSelectElement>(&document, RESOLUTION_ID)? {
        select.set_value(state.resolution().unwrap_or(""));
        select.set_disabled(!editable);
    }
    for input in inputs_with_class(&document, YEAR_CLASS) {
        input.set_checked(state.has_year(&input.value()));
        input.set_disabled(!editable);
    }
    for input in inputs_with_class(&document, STATE_CLASS) {
        input.set_checked(state.has_state(&input.value()));
        input.set_disabled(!editable);
    }

    set_hidden(&document, FILTER_PANEL_ID, !state.filters_visible())?;
    set_hidden(&document, LOADING_ID, !state.is_loading())?;

    if let Some(button) = element::<HtmlButtonElement>(&document, TRIGGER_ID)? {
        let trigger = state.trigger();
        button.set_text_content(Some(trigger.label.text()));
        button.set_disabled(!trigger.enabled);
    }

    if let Some(error) = element::<HtmlElement>(&document, ERROR_ID)? {
        error.set_text_content(state.error());
        error.set_hidden(state.error().is_none());
    }

    render_artifact(&document, state.artifact())
}

fn set_hidden(document: &Document, id: &str, hidden: bool) -> Result<(), JsValue> {
    if let Some(el) = element::<HtmlElement>(document, id)? {
        el.set_hidden(hidden);
    }
    Ok(())
}

fn render_artifact(document: &Document, artifact: Option<&str>) -> Result<(), JsValue> {
    let Some(container) = document.get_element_by_id(MAP_CONTAINER_ID) else {
        return Ok(());
    };
    let Some(src) = artifact else {
        container.set_inner_html("");
        return Ok(());
    };

    let shown = container
        .first_element_child()
        .and_then(|el| el.get_attribute("src"));
    if shown.as_deref() == Some(src) {
        return Ok(());
    }

    let iframe = document
        .create_element("iframe")?
        .dyn_into::<HtmlIFrameElement>()?;
    iframe.set_src(src);
    iframe.set_width("100%");
    iframe.set_height("100%");
    container.set_inner_html("");
    container.append_child(&iframe)?;
    Ok(())
}
