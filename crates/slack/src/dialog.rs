use serde::Serialize;
use serde_json::Value;

/// A legacy `dialog.open` form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlackDialog {
    title: String,
    callback_id: String,
    submit_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    notify_on_cancel: bool,
    elements: Vec<DialogElement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogElement {
    Text(TextElement),
    Textarea(TextElement),
    Select(SelectElement),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextElement {
    label: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtype: Option<TextSubtype>,
    optional: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSubtype {
    Email,
    Number,
    Tel,
    Url,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectElement {
    label: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    placeholder: Option<String>,
    optional: bool,
    options: Vec<SelectOption>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl TextElement {
    pub fn new(label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            value: None,
            placeholder: None,
            hint: None,
            subtype: None,
            optional: false,
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn subtype(mut self, subtype: TextSubtype) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

impl SelectElement {
    pub fn new(label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
            value: None,
            placeholder: None,
            optional: false,
            options: Vec::new(),
        }
    }

    pub fn option(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push(SelectOption { label: label.into(), value: value.into() });
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

impl SlackDialog {
    pub fn new(
        title: impl Into<String>,
        callback_id: impl Into<String>,
        submit_label: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            callback_id: callback_id.into(),
            submit_label: submit_label.into(),
            state: None,
            notify_on_cancel: false,
            elements: Vec::new(),
        }
    }

    /// Opaque string echoed back with the submission.
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn notify_on_cancel(mut self, notify: bool) -> Self {
        self.notify_on_cancel = notify;
        self
    }

    pub fn text(mut self, element: TextElement) -> Self {
        self.elements.push(DialogElement::Text(element));
        self
    }

    pub fn textarea(mut self, element: TextElement) -> Self {
        self.elements.push(DialogElement::Textarea(element));
        self
    }

    pub fn select(mut self, element: SelectElement) -> Self {
        self.elements.push(DialogElement::Select(element));
        self
    }

    pub fn callback_id(&self) -> &str {
        &self.callback_id
    }

    pub fn elements(&self) -> &[DialogElement] {
        &self.elements
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
