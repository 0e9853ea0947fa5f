use std::collections::HashMap;

const REDACTED: &str = "[REDACTED]";

/// Headers that carry credentials.
const SENSITIVE_HEADERS: [&str; 4] = ["private-token", "authorization", "cookie", "set-cookie"];

pub struct Sanitizer;

impl Sanitizer {
    /// Remove credentials from headers
    pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(key, value)| {
                let key_lower = key.to_lowercase();
                let value = if SENSITIVE_HEADERS.contains(&key_lower.as_str()) {
                    REDACTED.to_string()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Remove credentials from a URL's query string (`private_token=...`).
    pub fn sanitize_url(url: &str) -> String {
        let Some((base, query)) = url.split_once('?') else {
            return url.to_string();
        };
        let query = query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((key, _)) if key.eq_ignore_ascii_case("private_token") => {
                    format!("{key}={REDACTED}")
                }
                _ => pair.to_string(),
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("{base}?{query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_token_header_is_redacted() {
        let headers = HashMap::from([
            ("PRIVATE-TOKEN".to_string(), "glpat-secret".to_string()),
            ("accept".to_string(), "application/json".to_string()),
        ]);
        let sanitized = Sanitizer::sanitize_headers(&headers);
        assert_eq!(sanitized["PRIVATE-TOKEN"], "[REDACTED]");
        assert_eq!(sanitized["accept"], "application/json");
    }

    #[test]
    fn test_private_token_query_is_redacted() {
        assert_eq!(
            Sanitizer::sanitize_url("https://git.example.com/api/v4/projects?private_token=abc&page=2"),
            "https://git.example.com/api/v4/projects?private_token=[REDACTED]&page=2"
        );
        assert_eq!(
            Sanitizer::sanitize_url("https://git.example.com/api/v4/projects"),
            "https://git.example.com/api/v4/projects"
        );
    }
}
