use serde::Serialize;
use serde_json::Value;

pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A validation error shown next to one input of a submitted dialog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DialogFieldError {
    pub name: String,
    pub error: String,
}

impl DialogFieldError {
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self { name: name.into(), error: error.into() }
    }
}

/// The synchronous HTTP answer bot logic wants to give the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseScratchpad {
    status: u16,
    body: Option<String>,
    content_type: &'static str,
}

impl Default for ResponseScratchpad {
    fn default() -> Self {
        Self { status: 200, body: None, content_type: CONTENT_TYPE_TEXT }
    }
}

impl ResponseScratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_http_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn set_http_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
        self.content_type = CONTENT_TYPE_TEXT;
    }

    pub fn set_http_json(&mut self, body: &Value) {
        self.body = Some(body.to_string());
        self.content_type = CONTENT_TYPE_JSON;
    }

    /// Reports dialog submission errors; the platform keeps the dialog open.
    pub fn dialog_errors(&mut self, errors: &[DialogFieldError]) {
        if errors.is_empty() {
            return;
        }
        let body = serde_json::json!({ "errors": errors });
        self.set_http_json(&body);
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }
}
