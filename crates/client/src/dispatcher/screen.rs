use serde_json::Value;

use partyline_domain::RequestId;
use partyline_shared::ButtonOption;

/// What a player device currently shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Screen {
    #[default]
    Blank,
    Message(Value),
    Instructions(Value),
    Buttons {
        request_id: RequestId,
        prompt: Option<String>,
        options: Vec<ButtonOption>,
        /// Cleared the moment an option is picked.
        enabled: bool,
    },
}

impl Screen {
    pub fn is_blank(&self) -> bool {
        matches!(self, Screen::Blank)
    }

    /// Plain-text rendering for terminal clients.
    pub fn render(&self) -> String {
        match self {
            Screen::Blank => String::new(),
            Screen::Message(payload) => text_of(payload),
            Screen::Instructions(payload) => format!("* {}", text_of(payload)),
            Screen::Buttons {
                prompt,
                options,
                enabled,
                ..
            } => {
                let mut out = prompt.clone().unwrap_or_else(|| "Choose:".to_string());
                for option in options {
                    out.push_str(&format!("\n  [{}] {}", option.id, option.display_label()));
                }
                if !enabled {
                    out.push_str("\n  (answer sent)");
                }
                out
            }
        }
    }
}

fn text_of(payload: &Value) -> String {
    if let Some(text) = payload.as_str() {
        return text.to_string();
    }
    let title = payload.get("title").and_then(Value::as_str);
    let text = payload.get("text").and_then(Value::as_str);
    match (title, text) {
        (Some(title), Some(text)) => format!("{}: {}", title, text),
        (Some(one), None) | (None, Some(one)) => one.to_string(),
        (None, None) => payload.to_string(),
    }
}
