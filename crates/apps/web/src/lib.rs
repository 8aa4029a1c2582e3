use std::cell::RefCell;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use protocol::FilterSelection;
use selection::{Command, Event, SelectionState};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

mod api;
mod dom;

// Guard to prevent double-initialization of global state (relevant during hot reload).
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK_SET: OnceLock<()> = OnceLock::new();

thread_local! {
    static STATE: RefCell<SelectionState> = RefCell::new(SelectionState::new());
}

/// Safe TLS access helper that returns a default on teardown instead of panicking.
fn with_state<F, R>(f: F) -> R
where
    F: FnOnce(&RefCell<SelectionState>) -> R,
    R: Default,
{
    STATE.try_with(f).unwrap_or_default()
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    // Avoid double-initialization (can happen during hot-reload edge cases).
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    init_panic_hook();
    dom::bind_controls()?;
    // Evaluate the generate guard for the initial page state.
    dom::render(&snapshot())
}

fn init_panic_hook() {
    PANIC_HOOK_SET.get_or_init(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = info.to_string();
            web_sys::console::error_1(&JsValue::from_str(&msg));
        }));
    });
}

fn snapshot() -> SelectionState {
    with_state(|state| state.borrow().clone())
}

/// Runs one transition, re-renders, then performs the resulting command.
///
/// The state is never borrowed across the render or the command, so
/// callbacks fired from either can dispatch again.
pub(crate) fn dispatch(event: Event) {
    let command = with_state(|state| {
        let current = state.take();
        let (next, command) = current.step(event);
        *state.borrow_mut() = next;
        command
    });

    if let Err(err) = dom::render(&snapshot()) {
        log_error(&format!("render failed: {err:?}"));
    }

    match command {
        Some(Command::Generate(selection)) => spawn_local(generate(selection)),
        Some(Command::Reset) => spawn_local(reset()),
        None => {}
    }
}

async fn generate(selection: FilterSelection) {
    let event = match api::generate_map(&selection).await {
        Ok(response) => Event::GenerationSucceeded {
            html_file_path: response.html_file_path,
        },
        Err(message) => {
            log_error(&format!("map generation failed: {message}"));
            Event::GenerationFailed { message }
        }
    };
    dispatch(event);
}

/// Fire-and-forget: the UI has already reset, so failures only reach the console.
async fn reset() {
    if let Err(message) = api::reset_maps().await {
        log_error(&format!("map reset failed: {message}"));
    }
}

pub(crate) fn log_error(message: &str) {
    web_sys::console::error_1(&JsValue::from_str(message));
}
