use super::{DEFAULT_MODEL_NAME, View, ViewNotFound, ViewOutcome};
use crate::handler::HandlerOutput;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_TEMPLATE_EXTENSION: &str = "jsp";

/// Turns handler results into [`ViewOutcome`]s, locating templates under a views root.
#[derive(Debug, Clone)]
pub struct ViewResolver {
    root: PathBuf,
    extension: String,
}

impl ViewResolver {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into().trim_start_matches('.').to_owned();
        Self { root: root.into(), extension }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `/`-prefixes the template name and appends the extension if it has none.
    pub fn resolve_template(&self, name: &str) -> String {
        let mut path = if name.starts_with('/') { name.to_owned() } else { format!("/{name}") };
        if !self.extension.is_empty() && Path::new(&path).extension().is_none() {
            path.push('.');
            path.push_str(&self.extension);
        }
        path
    }

    pub async fn resolve(&self, output: HandlerOutput) -> Result<ViewOutcome, ViewNotFound> {
        match output {
            HandlerOutput::View(view) => self.resolve_view(view).await,
            HandlerOutput::Template(name) => {
                let template_path = self.locate(&name).await?;
                Ok(ViewOutcome::Render { template_path, primary_binding: None, additional_bindings: Default::default() })
            }
            HandlerOutput::Raw(value) => Ok(ViewOutcome::Raw { value }),
            HandlerOutput::Null => Ok(ViewOutcome::Raw { value: serde_json::Value::Null }),
        }
    }

    async fn resolve_view(&self, view: View) -> Result<ViewOutcome, ViewNotFound> {
        if let Some(target_url) = view.redirect_url() {
            return Ok(ViewOutcome::Redirect { target_url });
        }

        let template_path = self.locate(view.template()).await?;
        let View { name, data, additional, .. } = view;
        let primary_binding = data.map(|data| (name.unwrap_or_else(|| DEFAULT_MODEL_NAME.to_owned()), data));
        Ok(ViewOutcome::Render { template_path, primary_binding, additional_bindings: additional })
    }

    async fn locate(&self, name: &str) -> Result<String, ViewNotFound> {
        let template_path = self.resolve_template(name);
        let file = self.root.join(template_path.trim_start_matches('/'));

        match tokio::fs::metadata(&file).await {
            Ok(metadata) if metadata.is_file() => Ok(template_path),
            _ => {
                debug!(template = %template_path, file = %file.display(), "template file does not exist");
                Err(ViewNotFound { path: template_path })
            }
        }
    }
}

impl Default for ViewResolver {
    fn default() -> Self {
        Self::new("views", DEFAULT_TEMPLATE_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn resolver_with(files: &[&str]) -> (tempfile::TempDir, ViewResolver) {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "<html/>").unwrap();
        }
        let resolver = ViewResolver::new(dir.path(), "jsp");
        (dir, resolver)
    }

    #[test]
    fn template_resolution() {
        let resolver = ViewResolver::default();
        assert_eq!(resolver.resolve_template("productDetail"), "/productDetail.jsp");
        assert_eq!(resolver.resolve_template("/users/list"), "/users/list.jsp");
        assert_eq!(resolver.resolve_template("page.html"), "/page.html");
        assert_eq!(ViewResolver::new("v", ".tera").resolve_template("a"), "/a.tera");
    }

    #[tokio::test]
    async fn renders_existing_views() {
        let (_dir, resolver) = resolver_with(&["productDetail.jsp"]);

        let outcome = resolver.resolve(HandlerOutput::View(View::page_with("productDetail", json!({"id": 42})))).await;
        assert_eq!(
            outcome.unwrap(),
            ViewOutcome::Render {
                template_path: "/productDetail.jsp".into(),
                primary_binding: Some(("model".into(), json!({"id": 42}))),
                additional_bindings: Default::default(),
            }
        );

        let outcome = resolver.resolve(HandlerOutput::Template("productDetail".into())).await.unwrap();
        assert!(matches!(outcome, ViewOutcome::Render { primary_binding: None, .. }));
    }

    #[tokio::test]
    async fn missing_view() {
        let (_dir, resolver) = resolver_with(&[]);
        let err = resolver.resolve(HandlerOutput::View(View::page("nope"))).await.unwrap_err();
        assert_eq!(err.path, "/nope.jsp");
    }

    #[tokio::test]
    async fn redirects_skip_template_lookup() {
        let (_dir, resolver) = resolver_with(&[]);
        let outcome = resolver.resolve(HandlerOutput::View(View::redirect("users"))).await.unwrap();
        assert_eq!(outcome, ViewOutcome::Redirect { target_url: "/users".into() });
    }

    #[tokio::test]
    async fn raw_and_null() {
        let resolver = ViewResolver::default();
        assert_eq!(
            resolver.resolve(HandlerOutput::Raw(json!("ok"))).await.unwrap(),
            ViewOutcome::Raw { value: json!("ok") }
        );
        assert_eq!(resolver.resolve(HandlerOutput::Null).await.unwrap(), ViewOutcome::Raw { value: json!(null) });
    }
}
