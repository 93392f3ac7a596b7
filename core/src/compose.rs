//! Final URL composition: target resolution plus extra query items.
//!
//! # Query round-trip caveat
//! Merging extra query items parses the existing query into pairs and
//! serializes everything again with `application/x-www-form-urlencoded`
//! rules. That is not byte-identical to the original: `b/c` comes back as
//! `b%2Fc`, a literal `%20` comes back as `+`, and so on. Servers that
//! compare raw query strings (signed URLs, some storage services) may reject
//! the rewritten form. When there is nothing to merge the URL is passed
//! through untouched, so requests without extra items never pay this cost.

use url::Url;

use crate::error::EncodingError;
use crate::request::Target;

/// Resolves `target` against `base` and appends `extra` query items.
pub fn compose_url(
    base: &Url,
    target: &Target,
    extra: &[(String, String)],
) -> Result<Url, EncodingError> {
    let total = resolve_target(base, target)?;
    Ok(merge_query_items(total, extra))
}

/// Full URLs are used verbatim. Endpoints are appended to the base URL's
/// path with exactly one `/` between them; the base's query and fragment are
/// dropped.
pub fn resolve_target(base: &Url, target: &Target) -> Result<Url, EncodingError> {
    let endpoint = match target {
        Target::Full(url) => return Ok(url.clone()),
        Target::Endpoint(endpoint) => endpoint,
    };

    if base.cannot_be_a_base() {
        return Err(EncodingError::InvalidUrl {
            url: base.to_string(),
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        });
    }

    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    let path = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );
    url.set_path(&path);
    Ok(url)
}

/// Appends `extra` after the URL's existing query pairs. Pairs are never
/// merged by key; duplicates survive in order.
pub fn merge_query_items(mut url: Url, extra: &[(String, String)]) -> Url {
    if extra.is_empty() {
        return url;
    }

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    pairs.extend(extra.iter().cloned());
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:3000/api/").unwrap()
    }

    fn items(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn full_target_ignores_base() {
        let full = Url::parse("https://example.org/").unwrap();
        let url = compose_url(&base(), &Target::Full(full.clone()), &[]).unwrap();
        assert_eq!(url, full);
    }

    #[test]
    fn endpoint_is_appended_with_one_separator() {
        for endpoint in ["post", "/post"] {
            let url = resolve_target(&base(), &Target::Endpoint(endpoint.to_string())).unwrap();
            assert_eq!(url.as_str(), "http://localhost:3000/api/post");
        }
        let no_slash = Url::parse("http://localhost:3000/api").unwrap();
        let url = resolve_target(&no_slash, &Target::Endpoint("post".to_string())).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/post");
    }

    #[test]
    fn endpoint_drops_base_query() {
        let base = Url::parse("http://localhost/api?token=1#frag").unwrap();
        let url = resolve_target(&base, &Target::Endpoint("x".to_string())).unwrap();
        assert_eq!(url.as_str(), "http://localhost/api/x");
    }

    #[test]
    fn cannot_be_a_base_is_an_encoding_error() {
        let base = Url::parse("mailto:someone@example.org").unwrap();
        let err = resolve_target(&base, &Target::Endpoint("x".to_string())).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidUrl { .. }));
    }

    #[test]
    fn empty_extra_items_pass_url_through_untouched() {
        let raw = "https://example.org/path?sig=a/b+c%20d";
        let url = merge_query_items(Url::parse(raw).unwrap(), &[]);
        assert_eq!(url.as_str(), raw);
    }

    #[test]
    fn extra_items_are_appended_after_existing_pairs() {
        let url = Url::parse("https://example.org/p?a=1&b=2").unwrap();
        let url = merge_query_items(url, &items(&[("a", "3"), ("c", "4")]));
        assert_eq!(url.query(), Some("a=1&b=2&a=3&c=4"));
    }

    #[test]
    fn merging_reencodes_existing_query() {
        let url = Url::parse("https://example.org/p?path=b/c").unwrap();
        let url = merge_query_items(url, &items(&[("x", "y")]));
        assert_eq!(url.query(), Some("path=b%2Fc&x=y"));
    }
}
