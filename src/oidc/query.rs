use url::form_urlencoded;

/// Merge `params` into the query of `url`, replacing keys already present.
#[must_use]
pub fn add_query(url: &str, params: &[(&str, &str)]) -> String {
    let (rest, fragment) = match url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (url, None),
    };
    let (base, existing) = rest.split_once('?').unwrap_or((rest, ""));

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(existing.as_bytes())
        .into_owned()
        .collect();
    for (key, value) in params {
        if let Some(pair) = pairs.iter_mut().find(|(k, _)| k == key) {
            pair.1 = (*value).to_string();
        } else {
            pairs.push(((*key).to_string(), (*value).to_string()));
        }
    }

    let mut out = base.to_string();
    if !pairs.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&pairs)
            .finish();
        out.push('?');
        out.push_str(&query);
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Decode a query component: `%XX` escapes and `+` as space.
#[must_use]
pub fn query_unescape(value: &str) -> String {
    let escaped = format!("v={}", value.replace('&', "%26"));
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// `path` under `base` unless it is already absolute.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
