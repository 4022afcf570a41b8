//! Views returned by handlers and their resolution into response outcomes.

mod resolver;

pub use resolver::{DEFAULT_TEMPLATE_EXTENSION, ViewResolver};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Template prefix marking a redirect.
pub const REDIRECT_PREFIX: &str = "redirect:";

/// Name of the primary binding when a view carries data but no name.
pub const DEFAULT_MODEL_NAME: &str = "model";

/// Named values exposed to a template.
pub type Bindings = serde_json::Map<String, JsonValue>;

/// A template to render with its data, or a redirect.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct View {
    name: Option<String>,
    template: String,
    data: Option<JsonValue>,
    additional: Bindings,
}

impl View {
    /// A template rendered without data.
    pub fn page(template: impl Into<String>) -> Self {
        Self { template: template.into(), ..Self::default() }
    }

    /// A template rendered with `data` bound as `model`.
    pub fn page_with(template: impl Into<String>, data: impl Into<JsonValue>) -> Self {
        Self::named(DEFAULT_MODEL_NAME, template, data)
    }

    /// A template rendered with `data` bound under `name`.
    pub fn named(name: impl Into<String>, template: impl Into<String>, data: impl Into<JsonValue>) -> Self {
        Self { name: Some(name.into()), template: template.into(), data: Some(data.into()), ..Self::default() }
    }

    pub fn redirect(url: impl AsRef<str>) -> Self {
        Self::page(format!("{REDIRECT_PREFIX}{}", url.as_ref()))
    }

    /// Adds a binding next to the primary one.
    pub fn add_data(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.additional.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn data(&self) -> Option<&JsonValue> {
        self.data.as_ref()
    }

    pub fn additional(&self) -> &Bindings {
        &self.additional
    }

    pub fn is_redirect(&self) -> bool {
        self.template.starts_with(REDIRECT_PREFIX)
    }

    /// The redirect target, made absolute unless it is already absolute or names a
    /// scheme.
    pub fn redirect_url(&self) -> Option<String> {
        let url = self.template.strip_prefix(REDIRECT_PREFIX)?;
        if url.starts_with('/') || has_scheme(url) {
            Some(url.to_owned())
        } else {
            Some(format!("/{url}"))
        }
    }
}

/// Whether the url starts with `scheme://`.
fn has_scheme(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// What the dispatcher writes back for a handler result.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewOutcome {
    Redirect {
        target_url: String,
    },
    Render {
        template_path: String,
        primary_binding: Option<(String, JsonValue)>,
        additional_bindings: Bindings,
    },
    Raw {
        value: JsonValue,
    },
}

impl ViewOutcome {
    /// Every binding of a render outcome, additional bindings override the primary one.
    pub fn bindings(&self) -> Bindings {
        let ViewOutcome::Render { primary_binding, additional_bindings, .. } = self else {
            return Bindings::new();
        };

        let mut bindings = Bindings::new();
        if let Some((name, data)) = primary_binding {
            bindings.insert(name.clone(), data.clone());
        }
        bindings.extend(additional_bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        bindings
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("view not found: {path}")]
pub struct ViewNotFound {
    pub path: String,
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to render '{template}': {reason}")]
    Failed { template: String, reason: String },
}

impl RenderError {
    pub fn failed<S: ToString>(template: &str, reason: S) -> Self {
        Self::Failed { template: template.to_owned(), reason: reason.to_string() }
    }
}

/// Renders a resolved template with its bindings into HTML.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn render(&self, template_path: &str, bindings: &Bindings) -> Result<String, RenderError>;
}
