use http::{HeaderMap, Method, Uri};

/// The parts of an inbound request a token can be extracted from
///
/// Headers, query string and cookies are read from [`RequestParts::headers`]
/// and [`RequestParts::uri`]. Path parameters and form fields only exist once
/// a framework has routed the request or buffered its body, so they default
/// to absent.
pub trait RequestParts: Send + Sync {
    fn headers(&self) -> &HeaderMap;

    fn method(&self) -> &Method;

    fn uri(&self) -> &Uri;

    /// Value of a matched route parameter
    fn path_param(&self, _name: &str) -> Option<&str> {
        None
    }

    /// Value of a `application/x-www-form-urlencoded` body field
    fn form_field(&self, _name: &str) -> Option<&str> {
        None
    }
}

/// Owned request parts, as captured by the axum middleware
#[derive(Debug, Clone, Default)]
pub struct HttpRequestParts {
    pub headers: HeaderMap,
    pub method: Method,
    pub uri: Uri,
    /// Route parameters in match order
    pub path_params: Vec<(String, String)>,
    /// Decoded form fields in body order
    pub form_fields: Vec<(String, String)>,
}

pub(crate) fn first_value<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

impl RequestParts for HttpRequestParts {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn method(&self) -> &Method {
        &self.method
    }

    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn path_param(&self, name: &str) -> Option<&str> {
        first_value(&self.path_params, name)
    }

    fn form_field(&self, name: &str) -> Option<&str> {
        first_value(&self.form_fields, name)
    }
}
