//! The merged named-value source of a request.
//!
//! Query parameters, `application/x-www-form-urlencoded` fields and multipart
//! fields and files are merged into one [`NamedValues`]. Text values submitted
//! under the same name accumulate in submission order, files take precedence over
//! text of the same name.

use crate::binder::smart_convert;
use crate::error::{BodyError, BoxError};
use crate::upload::{Upload, UploadExtractor, UploadedFile};
use crate::value::Value;
use bytes::Bytes;
use http::HeaderMap;
use http_body::Body;
use http_body_util::BodyExt;
use std::collections::HashMap;
use tracing::warn;

/// One named request value before any type conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum NamedValue {
    Text(String),
    TextList(Vec<String>),
    File(UploadedFile),
    Files(Vec<UploadedFile>),
}

impl NamedValue {
    fn from_texts(mut texts: Vec<String>) -> Option<Self> {
        match texts.len() {
            0 => None,
            1 => texts.pop().map(NamedValue::Text),
            _ => Some(NamedValue::TextList(texts)),
        }
    }

    fn from_files(mut files: Vec<UploadedFile>) -> Option<Self> {
        match files.len() {
            0 => None,
            1 => files.pop().map(NamedValue::File),
            _ => Some(NamedValue::Files(files)),
        }
    }

    /// The value as submitted, text stays text.
    pub fn raw(&self) -> Value {
        match self {
            NamedValue::Text(text) => Value::Str(text.clone()),
            NamedValue::TextList(texts) => Value::List(texts.clone()),
            NamedValue::File(file) => Value::File(file.clone()),
            NamedValue::Files(files) => Value::Files(files.clone()),
        }
    }

    /// The value with single texts typed by [`smart_convert`].
    pub fn typed(&self) -> Value {
        match self {
            NamedValue::Text(text) => smart_convert(text),
            other => other.raw(),
        }
    }
}

/// All named values of a request. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct NamedValues {
    raw: HashMap<String, NamedValue>,
    typed: HashMap<String, Value>,
}

impl NamedValues {
    /// Builds the source from text pairs, e.g. a parsed query string.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::merge(pairs.into_iter().map(|(k, v)| (k.into(), v.into())), Upload::default())
    }

    /// Merges text pairs with the fields and files of a multipart upload.
    pub fn merge(pairs: impl IntoIterator<Item = (String, String)>, upload: Upload) -> Self {
        let mut texts: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in pairs {
            texts.entry(name).or_default().push(value);
        }

        let (files, fields) = upload.into_parts();
        for (name, values) in fields {
            texts.entry(name).or_default().extend(values);
        }

        let mut raw: HashMap<String, NamedValue> =
            texts.into_iter().filter_map(|(name, values)| NamedValue::from_texts(values).map(|v| (name, v))).collect();
        for (name, files) in files {
            if let Some(value) = NamedValue::from_files(files) {
                raw.insert(name, value);
            }
        }

        let typed = raw.iter().map(|(name, value)| (name.clone(), value.typed())).collect();
        Self { raw, typed }
    }

    /// Reads the named values of a request: its query string and, depending on the
    /// content type, its urlencoded or multipart body.
    pub async fn from_request<B>(
        query: Option<&str>,
        headers: &HeaderMap,
        body: B,
        extractor: &UploadExtractor,
    ) -> Result<Self, BodyError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let mut pairs = parse_query(query);

        let upload = if UploadExtractor::is_multipart(headers) {
            extractor.extract(headers, body).await?
        } else {
            if is_urlencoded(headers) {
                let bytes = body.collect().await.map_err(|e| BodyError::from_source(e.into()))?.to_bytes();
                let form: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes).map_err(BodyError::invalid)?;
                pairs.extend(form);
            }
            Upload::default()
        };

        Ok(Self::merge(pairs, upload))
    }

    pub fn get(&self, name: &str) -> Option<&NamedValue> {
        self.raw.get(name)
    }

    /// The untyped value of `name`.
    pub fn raw_value(&self, name: &str) -> Option<Value> {
        self.raw.get(name).map(NamedValue::raw)
    }

    /// Every value with single texts smart-typed.
    pub fn typed(&self) -> &HashMap<String, Value> {
        &self.typed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.raw.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return Vec::new();
    };
    serde_urlencoded::from_str(query).unwrap_or_else(|e| {
        warn!(cause = %e, query, "ignoring malformed query string");
        Vec::new()
    })
}

fn is_urlencoded(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .is_some_and(|mime| mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use http_body_util::Full;
    use indoc::indoc;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn repeated_names_become_lists() {
        let values = NamedValues::from_pairs([("tag", "a"), ("tag", "b"), ("id", "3")]);

        assert_eq!(values.get("tag"), Some(&NamedValue::TextList(vec!["a".into(), "b".into()])));
        assert_eq!(values.raw_value("id"), Some(Value::from("3")));
        assert_eq!(values.typed().get("id"), Some(&Value::Int(3)));
        assert_eq!(values.typed().get("tag"), Some(&Value::List(vec!["a".into(), "b".into()])));
    }

    #[test]
    fn files_override_text() {
        let mut upload_files = HashMap::new();
        upload_files.insert("avatar".to_owned(), vec![UploadedFile::from_bytes("avatar", "a.png", None, &b"png"[..])]);
        let upload = Upload::from_parts(upload_files, HashMap::new());

        let values = NamedValues::merge([("avatar".to_owned(), "text".to_owned())], upload);
        assert!(matches!(values.get("avatar"), Some(NamedValue::File(_))));
    }

    #[tokio::test]
    async fn merges_query_and_urlencoded_body() {
        let values = NamedValues::from_request(
            Some("page=2&name=query"),
            &headers("application/x-www-form-urlencoded; charset=UTF-8"),
            Full::new(Bytes::from_static(b"name=Ann&email=a%40b.com")),
            &UploadExtractor::default(),
        )
        .await
        .unwrap();

        assert_eq!(values.raw_value("email"), Some(Value::from("a@b.com")));
        assert_eq!(values.raw_value("page"), Some(Value::from("2")));
        assert_eq!(values.raw_value("name"), Some(Value::List(vec!["query".into(), "Ann".into()])));
    }

    #[tokio::test]
    async fn other_bodies_are_ignored() {
        let values = NamedValues::from_request(
            None,
            &headers("application/json"),
            Full::new(Bytes::from_static(b"{\"a\":1}")),
            &UploadExtractor::default(),
        )
        .await
        .unwrap();
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn multipart_fields_and_files() {
        let body = indoc! {r#"
            --zz
            Content-Disposition: form-data; name="title"

            Report
            --zz
            Content-Disposition: form-data; name="docs"; filename="a.txt"

            A
            --zz
            Content-Disposition: form-data; name="docs"; filename="b.txt"

            B
            --zz--
        "#}
        .replace('\n', "\r\n");

        let values = NamedValues::from_request(
            Some("lang=en"),
            &headers("multipart/form-data; boundary=zz"),
            Full::new(Bytes::from(body)),
            &UploadExtractor::default(),
        )
        .await
        .unwrap();

        assert_eq!(values.raw_value("title"), Some(Value::from("Report")));
        assert_eq!(values.raw_value("lang"), Some(Value::from("en")));
        let Some(NamedValue::Files(files)) = values.get("docs") else {
            panic!("expected a file list");
        };
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].original_filename(), "b.txt");
    }

    #[test]
    fn parses_query_pairs() {
        assert!(parse_query(Some("")).is_empty());
        assert_eq!(parse_query(Some("a=1&b")), vec![("a".to_owned(), "1".to_owned()), ("b".to_owned(), String::new())]);
    }
}
