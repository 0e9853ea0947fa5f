use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecordedEvent {
    pub timestamp: String,      // RFC 3339
    pub correlation_id: String, // Groups a request with its response
    pub event_type: EventType,
    pub direction: Direction,
    pub operation: String,       // e.g. "GET /api/v4/projects/7/merge_requests"
    pub data: serde_json::Value, // Sanitized request/response data
    pub metadata: HashMap<String, String>, // project_id / mr_iid taken from the path
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum EventType {
    GitLabApiCall,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Direction {
    Request,
    Response,
}

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
