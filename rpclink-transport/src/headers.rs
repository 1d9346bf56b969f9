use crate::http::Headers;
use rpclink_core::Operation;
use std::fmt;
use std::sync::Arc;

pub type HeaderFn = Arc<dyn Fn(&Operation) -> Headers + Send + Sync>;

/// Where a link gets its request headers from.
///
/// `Computed` is evaluated once per call, which is how per-request auth
/// tokens are attached.
#[derive(Clone)]
pub enum HeaderSource {
    Static(Headers),
    Computed(HeaderFn),
}

impl HeaderSource {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Operation) -> Headers + Send + Sync + 'static,
    {
        HeaderSource::Computed(Arc::new(f))
    }

    pub fn resolve(&self, op: &Operation) -> Headers {
        match self {
            HeaderSource::Static(headers) => headers.clone(),
            HeaderSource::Computed(f) => f(op),
        }
    }
}

impl Default for HeaderSource {
    fn default() -> Self {
        HeaderSource::Static(Headers::new())
    }
}

impl From<Headers> for HeaderSource {
    fn from(headers: Headers) -> Self {
        HeaderSource::Static(headers)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for HeaderSource {
    fn from(pairs: [(&str, &str); N]) -> Self {
        HeaderSource::Static(
            pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        )
    }
}

impl fmt::Debug for HeaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderSource::Static(headers) => f.debug_tuple("Static").field(headers).finish(),
            HeaderSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Overlay `overrides` on `defaults`. Names compare case-insensitively and the
/// override always wins.
pub fn merge_headers(defaults: Headers, overrides: Headers) -> Headers {
    let mut merged = defaults;
    for (name, value) in overrides {
        merged.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        merged.insert(name, value);
    }
    merged
}
