//! Small helpers shared by the backend adapters and the CLI.

/// How much of an unparsed response body an error message carries.
const ERROR_EXCERPT_CHARS: usize = 200;

/// Trimmed text, or `None` when nothing is left.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Whether `value` is an absolute http(s) URL with something after the scheme.
///
/// The scheme is matched case-insensitively.
pub fn is_http_url(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    ["http://", "https://"].iter().any(|scheme| {
        lower
            .strip_prefix(scheme)
            .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'))
    })
}

/// One-line excerpt of a backend response body for error messages.
///
/// Whitespace runs (HTML error pages, pretty-printed JSON) collapse to a
/// single space and long bodies are cut with `...`.
pub fn error_excerpt(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "<empty body>".to_string();
    }
    if collapsed.chars().count() <= ERROR_EXCERPT_CHARS {
        return collapsed;
    }

    let mut excerpt = collapsed
        .chars()
        .take(ERROR_EXCERPT_CHARS)
        .collect::<String>();
    excerpt.push_str("...");
    excerpt
}

/// Current Unix time in seconds, the unit of JWT `exp` claims.
pub fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_config_values_are_unset() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \t".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" travelsnap-dev ".to_string())),
            Some("travelsnap-dev".to_string())
        );
    }

    #[test]
    fn endpoint_urls_need_scheme_and_host() {
        assert!(is_http_url("http://127.0.0.1:8080"));
        assert!(is_http_url(" HTTPS://firestore.googleapis.com "));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("https:///v1/projects"));
        assert!(!is_http_url("gs://travelsnap-dev.appspot.com"));
        assert!(!is_http_url("firestore.googleapis.com"));
    }

    #[test]
    fn error_excerpt_flattens_html_pages() {
        let body = "<html>\n  <body>\n    <h1>502 Bad Gateway</h1>\n  </body>\n</html>\n";
        assert_eq!(
            error_excerpt(body),
            "<html> <body> <h1>502 Bad Gateway</h1> </body> </html>"
        );
        assert_eq!(error_excerpt(" \n "), "<empty body>");
    }

    #[test]
    fn error_excerpt_cuts_long_bodies() {
        let body = "x".repeat(500);
        let excerpt = error_excerpt(&body);
        assert_eq!(excerpt.len(), ERROR_EXCERPT_CHARS + 3);
        assert!(excerpt.ends_with("..."));
    }
}
