//! Request Dispatcher: turns `server:request`s into what the player sees.
//!
//! Handlers are looked up by request `type` in an extensible table. Any new
//! request replaces the screen and cancels a pending `timedmessage` clear;
//! clears come back to the owner as [`ClearTimer`]s tagged with a
//! generation so a superseded timer never blanks a newer screen.

mod screen;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use partyline_shared::{request_types, Request, Response};

pub use screen::Screen;

/// What a handler wants shown.
#[derive(Debug, Clone, PartialEq)]
pub struct UiAction {
    pub screen: Screen,
    pub clear_after: Option<Duration>,
}

impl UiAction {
    pub fn show(screen: Screen) -> Self {
        Self {
            screen,
            clear_after: None,
        }
    }
}

/// `None` means the payload did not fit the handler.
pub type RequestHandler = Arc<dyn Fn(&Request) -> Option<UiAction> + Send + Sync>;

/// A `timedmessage` expiry, to be passed back to [`RequestDispatcher::on_clear`].
#[derive(Debug)]
pub struct ClearTimer {
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("No selection is on screen")]
    NoActiveSelection,
    #[error("This selection was already answered")]
    AlreadyAnswered,
    #[error("Unknown option: {0}")]
    UnknownOption(String),
}

pub struct RequestDispatcher {
    handlers: HashMap<String, RequestHandler>,
    screen: watch::Sender<Screen>,
    clears: mpsc::UnboundedSender<ClearTimer>,
    pending_clear: Option<(u64, CancellationToken)>,
    generation: u64,
}

impl RequestDispatcher {
    /// Dispatcher with the four standard request types registered.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClearTimer>) {
        let (clears, rx) = mpsc::unbounded_channel();
        let (screen, _) = watch::channel(Screen::Blank);
        let mut dispatcher = Self {
            handlers: HashMap::new(),
            screen,
            clears,
            pending_clear: None,
            generation: 0,
        };

        dispatcher.register(request_types::MESSAGE, |request| {
            Some(UiAction::show(Screen::Message(request.payload.clone())))
        });
        dispatcher.register(request_types::INSTRUCTIONS, |request| {
            Some(UiAction::show(Screen::Instructions(request.payload.clone())))
        });
        dispatcher.register(request_types::TIMED_MESSAGE, |request| {
            Some(UiAction {
                screen: Screen::Message(request.payload.clone()),
                clear_after: request.timer.map(|s| Duration::from_secs(u64::from(s))),
            })
        });
        dispatcher.register(request_types::BUTTON_SELECT, |request| {
            let payload = request.button_select_payload().ok()?;
            Some(UiAction::show(Screen::Buttons {
                request_id: request.id,
                prompt: payload.prompt,
                options: payload.options,
                enabled: true,
            }))
        });

        (dispatcher, rx)
    }

    /// Add or replace the handler for a request type.
    pub fn register<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&Request) -> Option<UiAction> + Send + Sync + 'static,
    {
        self.handlers.insert(kind.into(), Arc::new(handler));
    }

    pub fn subscribe(&self) -> watch::Receiver<Screen> {
        self.screen.subscribe()
    }

    pub fn screen(&self) -> Screen {
        self.screen.borrow().clone()
    }

    /// Show a request. Returns `false` when it was dropped.
    pub fn dispatch(&mut self, request: &Request) -> bool {
        let Some(handler) = self.handlers.get(&request.kind).cloned() else {
            tracing::warn!(kind = %request.kind, request_id = %request.id, "Unknown request type dropped");
            return false;
        };
        let Some(action) = handler(request) else {
            tracing::warn!(kind = %request.kind, request_id = %request.id, "Malformed request payload dropped");
            return false;
        };

        self.cancel_clear();
        self.generation += 1;
        tracing::debug!(kind = %request.kind, request_id = %request.id, "Request shown");
        self.screen.send_replace(action.screen);

        if let Some(delay) = action.clear_after {
            self.schedule_clear(delay);
        }
        true
    }

    pub fn on_clear(&mut self, timer: ClearTimer) {
        match &self.pending_clear {
            Some((generation, _)) if *generation == timer.generation => {
                self.pending_clear = None;
                self.screen.send_replace(Screen::Blank);
                tracing::debug!("Timed message cleared");
            }
            _ => tracing::trace!(generation = timer.generation, "Superseded clear ignored"),
        }
    }

    /// Pick an option of the on-screen selection. The control is disabled
    /// before the response is handed back, so only the first pick counts.
    pub fn select(&mut self, option_id: &str) -> Result<Response, SelectError> {
        let mut result = Err(SelectError::NoActiveSelection);
        self.screen.send_if_modified(|screen| {
            let Screen::Buttons {
                request_id,
                options,
                enabled,
                ..
            } = screen
            else {
                return false;
            };
            if !*enabled {
                result = Err(SelectError::AlreadyAnswered);
                return false;
            }
            let Some(option) = options.iter().find(|o| o.id == option_id) else {
                result = Err(SelectError::UnknownOption(option_id.to_string()));
                return false;
            };
            *enabled = false;
            result = Ok(Response {
                request_id: *request_id,
                value: Value::String(option.token().to_string()),
            });
            true
        });
        result
    }

    pub fn clear(&mut self) {
        self.cancel_clear();
        self.generation += 1;
        self.screen.send_replace(Screen::Blank);
    }

    fn cancel_clear(&mut self) {
        if let Some((_, token)) = self.pending_clear.take() {
            token.cancel();
        }
    }

    fn schedule_clear(&mut self, delay: Duration) {
        let generation = self.generation;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let clears = self.clears.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = clears.send(ClearTimer { generation });
                }
            }
        });
        self.pending_clear = Some((generation, token));
    }
}
