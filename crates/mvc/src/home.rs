//! The route listing served at the root path.

use crate::router::Router;
use std::fmt::Write;

const STYLE: &str = "body { font-family: Arial, sans-serif; margin: 40px; } \
    .route { background: #f9f9f9; padding: 10px; margin: 5px 0; border-left: 5px solid #ff9800; } \
    .route.get { border-left-color: #4caf50; } \
    .route.post { border-left-color: #2196f3; }";

/// Renders every registered route with its method and metadata as an HTML page.
pub fn render_home(router: &Router) -> String {
    let mut html = String::with_capacity(1024);
    html.push_str("<!DOCTYPE html><html><head><title>Registered routes</title><style>");
    html.push_str(STYLE);
    html.push_str("</style></head><body><h1>Registered routes</h1>");

    // writing into a String never fails
    let _ = write!(html, "<p><strong>Routes:</strong> {}</p>", router.len());

    if router.is_empty() {
        html.push_str("<p>No route registered.</p>");
    }

    for descriptor in router.routes() {
        let method = descriptor.method().as_str();
        let pattern = descriptor.url_pattern();
        let url = if pattern.starts_with('/') { pattern.to_owned() } else { format!("/{pattern}") };
        let metadata = descriptor.metadata();

        let _ = write!(
            html,
            "<div class='route {}'><p><strong>URL:</strong> {}{}</p><p><strong>Method:</strong> {}</p>\
             <p><strong>Parameters:</strong> {}</p><p><strong>Author:</strong> {} (version {})</p></div>",
            method.to_ascii_lowercase(),
            escape(&url),
            if descriptor.is_dynamic() { " (dynamic)" } else { "" },
            escape(method),
            descriptor.parameters().len(),
            escape(&metadata.author),
            metadata.version,
        );
    }

    html.push_str("</body></html>");
    html
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerDescriptor, handler_fn};

    async fn noop() {}

    #[test]
    fn lists_routes() {
        let router = Router::builder()
            .route(HandlerDescriptor::get("products/{id}", handler_fn(noop)).author("ann"))
            .route(HandlerDescriptor::post("create-user", handler_fn(noop)))
            .build();

        let html = render_home(&router);
        assert!(html.contains("/products/{id} (dynamic)"));
        assert!(html.contains("/create-user"));
        assert!(html.contains("<strong>Method:</strong> POST"));
        assert!(html.contains("ann (version 1)"));
        assert!(html.contains("<strong>Routes:</strong> 2"));
    }

    #[test]
    fn escapes_metadata() {
        let router = Router::builder()
            .route(HandlerDescriptor::get("x", handler_fn(noop)).author("<script>alert('x')</script>"))
            .build();

        let html = render_home(&router);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
    }

    #[test]
    fn empty_router() {
        assert!(render_home(&Router::default()).contains("No route registered."));
    }
}
