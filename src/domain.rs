use url::Url;

/// Canonicalizes a domain for tracker matching: lowercase, with a single
/// leading `www.` removed. `www.` anywhere else in the name is left alone.
pub fn normalize_domain(domain: &str) -> String {
    if domain.is_empty() {
        return String::new();
    }

    let lowered = domain.to_ascii_lowercase();
    match lowered.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lowered,
    }
}

/// Extracts the host from a URL string. Returns `None` for anything that
/// does not parse as a URL with a host (data: URIs, about:blank, etc.).
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(|host| host.to_string())
}
