//! Fuzzable requests
//!
//! A fuzzable request is an HTTP request template whose parameters can be
//! injected by audit plugins. Two requests that only differ in parameter
//! values are the same request point.

use crate::transport::HttpResponse;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use url::Url;
use url::form_urlencoded;

/// HTTP methods the engine knows how to replay
const FORM_METHODS: &[&str] = &["GET", "POST"];

/// Identity of a request point: method, URL without query/fragment and
/// the sorted parameter names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId {
    method: String,
    url: String,
    params: BTreeSet<String>,
}

/// An HTTP request template with an injectable parameter set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuzzableRequest {
    method: String,
    url: Url,
    params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl FuzzableRequest {
    /// GET request; parameters are taken from the query string
    pub fn get(url: Url) -> Self {
        let params = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self {
            method: "GET".to_string(),
            url,
            params,
            headers: Vec::new(),
        }
    }

    /// POST request with url-encoded form parameters
    pub fn post(url: Url, params: Vec<(String, String)>) -> Self {
        Self {
            method: "POST".to_string(),
            url,
            params,
            headers: Vec::new(),
        }
    }

    /// Add a header sent along with this request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Request method, upper case
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Full request URL (query string included for GET requests)
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Injectable parameters
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Extra headers
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Url-encoded body for POST requests, empty otherwise
    pub fn post_data(&self) -> String {
        if self.method != "POST" {
            return String::new();
        }
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }

    /// Origin of the request URL, used for scope checks
    pub fn base_url(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Remove the `#fragment` part of the URL
    pub fn strip_fragment(&mut self) {
        self.url.set_fragment(None);
    }

    /// Identity used for de-duplication
    pub fn id(&self) -> RequestId {
        let mut url = self.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        RequestId {
            method: self.method.clone(),
            url: url.to_string(),
            params: self.params.iter().map(|(k, _)| k.clone()).collect(),
        }
    }
}

impl fmt::Display for FuzzableRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | Method: {}", self.url, self.method)?;
        if !self.params.is_empty() {
            let names: Vec<&str> = self.params.iter().map(|(k, _)| k.as_str()).collect();
            write!(f, " | Parameters: ({})", names.join(", "))?;
        }
        Ok(())
    }
}

/// Build the fuzzable requests a response exposes: the response URL itself
/// and every HTML form it contains
pub fn fuzzable_requests_from_response(response: &HttpResponse) -> Vec<FuzzableRequest> {
    let mut requests = vec![FuzzableRequest::get(response.url.clone())];
    if response.is_html() {
        requests.extend(forms_from_html(&response.url, &response.body));
    }
    requests
}

/// Extract every `<form>` of an HTML document as a fuzzable request
pub fn forms_from_html(base: &Url, html: &str) -> Vec<FuzzableRequest> {
    let document = Html::parse_document(html);
    let (Ok(form_selector), Ok(field_selector)) = (
        Selector::parse("form"),
        Selector::parse("input[name], select[name], textarea[name]"),
    ) else {
        return Vec::new();
    };

    let mut requests = Vec::new();
    for form in document.select(&form_selector) {
        let action = form.value().attr("action").unwrap_or("");
        let Ok(mut action_url) = base.join(action) else {
            continue;
        };
        action_url.set_fragment(None);

        let method = form
            .value()
            .attr("method")
            .unwrap_or("GET")
            .to_ascii_uppercase();
        if !FORM_METHODS.contains(&method.as_str()) {
            continue;
        }

        let params: Vec<(String, String)> = form
            .select(&field_selector)
            .filter_map(|field| {
                let name = field.value().attr("name")?;
                let value = field.value().attr("value").unwrap_or("");
                Some((name.to_string(), value.to_string()))
            })
            .collect();

        if method == "POST" {
            requests.push(FuzzableRequest::post(action_url, params));
        } else {
            action_url
                .query_pairs_mut()
                .clear()
                .extend_pairs(params.iter());
            requests.push(FuzzableRequest::get(action_url));
        }
    }
    requests
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn identity_ignores_parameter_values() {
        let a = FuzzableRequest::get(url("http://host.tld/?id=3739286&action=create"));
        let b = FuzzableRequest::get(url("http://host.tld/?action=remove&id=1"));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn identity_depends_on_method_and_names() {
        let get = FuzzableRequest::get(url("http://host.tld/login?user=a"));
        let post = FuzzableRequest::post(url("http://host.tld/login"), vec![("user".into(), "a".into())]);
        let other = FuzzableRequest::get(url("http://host.tld/login?name=a"));
        assert_ne!(get.id(), post.id());
        assert_ne!(get.id(), other.id());
    }

    #[test]
    fn identity_ignores_fragment() {
        let a = FuzzableRequest::get(url("http://host.tld/page#section"));
        let b = FuzzableRequest::get(url("http://host.tld/page"));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn strip_fragment_keeps_query() {
        let mut request = FuzzableRequest::get(url("http://host.tld/page?a=1#top"));
        request.strip_fragment();
        assert_eq!(request.url().as_str(), "http://host.tld/page?a=1");
    }

    #[test]
    fn post_data_is_urlencoded() {
        let request = FuzzableRequest::post(
            url("http://host.tld/login"),
            vec![("user".into(), "a b".into()), ("pass".into(), "x&y".into())],
        );
        assert_eq!(request.post_data(), "user=a+b&pass=x%26y");
        assert_eq!(FuzzableRequest::get(url("http://host.tld/?a=1")).post_data(), "");
    }

    #[test]
    fn display_lists_parameter_names() {
        let request = FuzzableRequest::get(url("http://host.tld/?id=1&q=x"));
        assert_eq!(
            request.to_string(),
            "http://host.tld/?id=1&q=x | Method: GET | Parameters: (id, q)"
        );
    }

    #[test]
    fn extracts_forms() {
        let html = r#"
            <html><body>
              <form action="/login" method="post">
                <input name="user" value="">
                <input type="password" name="pass">
                <input type="submit">
              </form>
              <form action="search">
                <input name="q" value="rust">
              </form>
              <form action="/upload" method="put"><input name="f"></form>
            </body></html>
        "#;
        let base = url("http://host.tld/dir/index.html");
        let forms = forms_from_html(&base, html);
        assert_eq!(forms.len(), 2);

        assert_eq!(forms[0].method(), "POST");
        assert_eq!(forms[0].url().as_str(), "http://host.tld/login");
        let names: Vec<&str> = forms[0].params().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["user", "pass"]);

        assert_eq!(forms[1].method(), "GET");
        assert_eq!(forms[1].url().as_str(), "http://host.tld/dir/search?q=rust");
    }

    #[test]
    fn response_yields_its_own_url_first() {
        let response = HttpResponse {
            url: url("http://host.tld/"),
            status: 200,
            headers: vec![("content-type".into(), "text/html".into())],
            body: r#"<form action="/f"><input name="a"></form>"#.into(),
        };
        let requests = fuzzable_requests_from_response(&response);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url().as_str(), "http://host.tld/");
    }
}
