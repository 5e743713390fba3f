//! Key resolution for unreliably-encoded storage keys.
//!
//! The upstream storage-creation event delivers keys whose URL encoding is
//! inconsistent (literal spaces, `+`, `%20`). Resolution tries a fixed,
//! ordered list of encoding variants and finally falls back to listing the
//! parent prefix and matching on the space-normalized filename.

use crate::core::errors::ApiError;
use crate::storage::object::ObjectStore;

/// Return the key under which the object actually exists.
///
/// Variant order matters and must not change: literal key, plus-decoded,
/// plus-re-encoded, percent-re-encoded (slashes preserved), then the
/// prefix-listing fallback.
pub async fn resolve_key(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<String, ApiError> {
    let mut variants: Vec<String> = vec![key.to_string()];

    let decoded = unquote_plus(key);
    if decoded != key {
        variants.push(decoded.clone());
    }

    let plus_encoded = quote_plus(&decoded);
    if plus_encoded != key && plus_encoded != decoded {
        variants.push(plus_encoded);
    }

    let percent_encoded = quote_path(&decoded);
    if percent_encoded != key && !variants.contains(&percent_encoded) {
        variants.push(percent_encoded);
    }

    for variant in &variants {
        tracing::debug!(bucket, key = variant.as_str(), "trying key variant");
        if matches!(store.head(bucket, variant).await, Ok(true)) {
            return Ok(variant.clone());
        }
    }

    // None of the encoding variants exist; scan the parent prefix for an
    // object whose filename matches after normalizing space encodings.
    let prefix = parent_prefix(key);
    let expected = normalize_spaces(filename(key));
    match store.list(bucket, &prefix).await {
        Ok(keys) => {
            for actual in keys {
                if normalize_spaces(filename(&actual)) == expected
                    && matches!(store.head(bucket, &actual).await, Ok(true))
                {
                    tracing::info!(bucket, key = actual.as_str(), "resolved via prefix listing");
                    return Ok(actual);
                }
            }
        }
        Err(err) => {
            tracing::warn!(bucket, prefix, "prefix listing failed: {err}");
        }
    }

    Err(ApiError::NotFound(format!(
        "could not find object in bucket '{bucket}' with key '{key}' or any variation; tried {variants:?}"
    )))
}

/// `+` to space, then percent-decode. Falls back to the plus-replaced form
/// when the key is not valid percent-encoded UTF-8.
pub fn unquote_plus(key: &str) -> String {
    let replaced = key.replace('+', " ");
    match urlencoding::decode(&replaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => replaced,
    }
}

/// Percent-encode everything (including `/`), spaces as `+`.
fn quote_plus(key: &str) -> String {
    urlencoding::encode(key).replace("%20", "+")
}

/// Percent-encode each path segment, preserving `/` separators.
fn quote_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn parent_prefix(key: &str) -> String {
    match key.rsplit_once('/') {
        Some((parent, _)) => format!("{parent}/"),
        None => String::new(),
    }
}

fn filename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn normalize_spaces(name: &str) -> String {
    name.replace('+', " ").replace("%20", " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::object::testing::MemoryObjectStore;

    const BUCKET: &str = "documents";
    const STORED: &str = "uploads/user-1/doc-1/annual report.txt";

    #[test]
    fn decode_and_encode_variants() {
        assert_eq!(unquote_plus("a+b%20c"), "a b c");
        assert_eq!(quote_plus("a b/c"), "a+b%2Fc");
        assert_eq!(quote_path("up loads/a b.txt"), "up%20loads/a%20b.txt");
    }

    #[tokio::test]
    async fn literal_key_wins_first() {
        let store = MemoryObjectStore::with_object(BUCKET, STORED, b"x");
        let resolved = resolve_key(&store, BUCKET, STORED).await.unwrap();
        assert_eq!(resolved, STORED);
    }

    #[tokio::test]
    async fn percent_encoded_request_resolves() {
        let store = MemoryObjectStore::with_object(BUCKET, STORED, b"x");
        let resolved = resolve_key(&store, BUCKET, "uploads/user-1/doc-1/annual%20report.txt")
            .await
            .unwrap();
        assert_eq!(resolved, STORED);
    }

    #[tokio::test]
    async fn plus_encoded_request_resolves() {
        let store = MemoryObjectStore::with_object(BUCKET, STORED, b"x");
        let resolved = resolve_key(&store, BUCKET, "uploads/user-1/doc-1/annual+report.txt")
            .await
            .unwrap();
        assert_eq!(resolved, STORED);
    }

    #[tokio::test]
    async fn stored_plus_found_by_space_request_via_listing() {
        // Object stored with a literal '+' in its name; the request uses a
        // space, so no direct variant matches and the listing fallback runs.
        let stored = "uploads/user-1/doc-1/a+b.txt";
        let store = MemoryObjectStore::with_object(BUCKET, stored, b"x");
        let resolved = resolve_key(&store, BUCKET, "uploads/user-1/doc-1/a b.txt")
            .await
            .unwrap();
        assert_eq!(resolved, stored);
    }

    #[tokio::test]
    async fn missing_object_reports_attempted_variants() {
        let store = MemoryObjectStore::default();
        let err = resolve_key(&store, BUCKET, "uploads/u/d/missing%20file.txt")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing%20file.txt"));
        assert!(message.contains("missing file.txt"));
    }
}
