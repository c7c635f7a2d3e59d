//! Resolution of relative API paths against the configured endpoint.

use crate::errors::ApiClientError;
use url::Url;

/// Builds the absolute URL for `path`.
///
/// A path that already starts with the endpoint's own path replaces the
/// endpoint path outright, so callers may pass either `servers/` or
/// `/api/2.0/servers/`. Anything else is joined below the endpoint path.
/// The resulting path always ends with `/`; a query string in `path` is kept.
pub fn resolve(endpoint: &Url, path: &str) -> Result<Url, ApiClientError> {
    let mut url = if path.starts_with(endpoint.path()) {
        let (path_part, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let mut url = endpoint.clone();
        url.set_path(path_part);
        url.set_query(query);
        url.set_fragment(None);
        url
    } else {
        let relative = path.strip_prefix('/').unwrap_or(path);
        directory_base(endpoint).join(relative)?
    };

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// The endpoint with a trailing `/`, so `join` appends instead of replacing
/// the last segment.
fn directory_base(endpoint: &Url) -> Url {
    let mut base = endpoint.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}
