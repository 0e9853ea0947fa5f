use super::sanitizer::Sanitizer;
use super::types::CORRELATION_ID_HEADER;
use super::{Direction, EventType, RecordedEvent, RecordingLogger};
use reqwest::header::HeaderValue;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use std::collections::HashMap;
use uuid::Uuid;

pub struct RecordingMiddleware {
    logger: RecordingLogger,
}

impl RecordingMiddleware {
    pub fn new(logger: RecordingLogger) -> Self {
        Self { logger }
    }
}

#[async_trait::async_trait]
impl Middleware for RecordingMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let correlation_id = Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&correlation_id) {
            req.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }

        let request_data = extract_request_data(&req);
        let operation = format!("{} {}", request_data.method, req.url().path());
        let metadata = path_metadata(req.url().path());
        self.record(
            &correlation_id,
            &metadata,
            Direction::Request,
            operation,
            serde_json::to_value(&request_data).unwrap_or(serde_json::Value::Null),
        );

        let response = next.run(req, extensions).await;

        match &response {
            Ok(resp) => {
                let response_data = extract_response_data(resp);
                self.record(
                    &correlation_id,
                    &metadata,
                    Direction::Response,
                    format!("response_{}", response_data.status_code),
                    serde_json::to_value(&response_data).unwrap_or(serde_json::Value::Null),
                );
            }
            Err(err) => {
                self.record(
                    &correlation_id,
                    &metadata,
                    Direction::Response,
                    "error".to_string(),
                    serde_json::json!({
                        "error": err.to_string(),
                        "error_type": format!("{:?}", err)
                    }),
                );
            }
        }

        response
    }
}

impl RecordingMiddleware {
    fn record(
        &self,
        correlation_id: &str,
        metadata: &HashMap<String, String>,
        direction: Direction,
        operation: String,
        data: serde_json::Value,
    ) {
        self.logger.record(RecordedEvent {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: correlation_id.to_string(),
            event_type: EventType::GitLabApiCall,
            direction,
            operation,
            data,
            metadata: metadata.clone(),
        });
    }
}

/// Project id and merge request iid named by a GitLab API path, when present.
fn path_metadata(path: &str) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    while let Some(segment) = segments.next() {
        let key = match segment {
            "projects" => "project_id",
            "merge_requests" => "mr_iid",
            _ => continue,
        };
        if let Some(value) = segments.next() {
            metadata.insert(key.to_string(), value.to_string());
        }
    }
    metadata
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (name, value) in headers {
        if let Ok(value_str) = value.to_str() {
            map.insert(name.to_string(), value_str.to_string());
        }
    }
    Sanitizer::sanitize_headers(&map)
}

fn extract_request_data(request: &Request) -> RequestData {
    let body = match request.body() {
        Some(body) => match body.as_bytes() {
            Some(bytes) if bytes.len() > 10_000 => format!("[LARGE_BODY_{}b]", bytes.len()),
            Some(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(_) => format!("[BINARY_BODY_{}b]", bytes.len()),
            },
            None => "[STREAM_BODY]".to_string(),
        },
        None => "[NO_BODY]".to_string(),
    };

    RequestData {
        method: request.method().to_string(),
        url: Sanitizer::sanitize_url(request.url().as_str()),
        headers: header_map(request.headers()),
        body,
    }
}

fn extract_response_data(response: &Response) -> ResponseData {
    ResponseData {
        status_code: response.status().as_u16(),
        headers: header_map(response.headers()),
        body_size: response.content_length().unwrap_or(0),
    }
}

#[derive(Debug, serde::Serialize)]
struct RequestData {
    method: String,
    url: String,
    headers: HashMap<String, String>,
    body: String,
}

#[derive(Debug, serde::Serialize)]
struct ResponseData {
    status_code: u16,
    headers: HashMap<String, String>,
    body_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_metadata_names_project_and_merge_request() {
        let metadata = path_metadata("/api/v4/projects/7/merge_requests/12/award_emoji/400");
        assert_eq!(metadata.get("project_id").map(String::as_str), Some("7"));
        assert_eq!(metadata.get("mr_iid").map(String::as_str), Some("12"));
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn test_path_metadata_project_listing() {
        let metadata = path_metadata("/api/v4/projects/7/merge_requests");
        assert_eq!(metadata.get("project_id").map(String::as_str), Some("7"));
        assert!(!metadata.contains_key("mr_iid"));
        assert!(path_metadata("/api/v4/version").is_empty());
    }
}
