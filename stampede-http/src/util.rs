pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(super) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

/// Lowercases names and joins repeated headers with ", ".
pub(super) fn merge_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::with_capacity(headers.len());
    for (name, value) in headers {
        let key = name.as_str().to_ascii_lowercase();
        let v = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match merged.iter_mut().find(|(k, _)| *k == key) {
            Some((_, cur)) => {
                cur.push_str(", ");
                cur.push_str(&v);
            }
            None => merged.push((key, v)),
        }
    }
    merged.sort_by(|a, b| a.0.cmp(&b.0));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_header_keeps_explicit_port() {
        let u = url::Url::parse("http://127.0.0.1:5004/liveness")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("127.0.0.1:5004"));

        let u = url::Url::parse("https://example.com/").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("example.com"));
    }

    #[test]
    fn merge_headers_joins_repeated_values() {
        let mut h = http::HeaderMap::new();
        h.append("Set-Cookie", http::HeaderValue::from_static("a=1"));
        h.append("set-cookie", http::HeaderValue::from_static("b=2"));
        h.append("Content-Type", http::HeaderValue::from_static("text/plain"));

        assert_eq!(
            merge_headers(&h),
            vec![
                ("content-type".to_string(), "text/plain".to_string()),
                ("set-cookie".to_string(), "a=1, b=2".to_string()),
            ]
        );
    }
}
