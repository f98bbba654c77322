//! Remote API request and response types
//!
//! Every endpoint answers with the same envelope: a business `code` (200 on
//! success, independent of the HTTP status), a `message`, and optional `data`.

use serde::{Deserialize, Serialize};

/// Business code of a successful call.
pub const CODE_OK: i64 = 200;

/// Response envelope shared by every endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

/// `POST /api/fs/list` request body
#[derive(Debug, Clone, Serialize)]
pub struct ListRequest<'a> {
    pub path: &'a str,
    pub page: u32,
    /// `0` asks for every entry in one page.
    pub per_page: u32,
    pub refresh: bool,
}

impl<'a> ListRequest<'a> {
    pub fn all(path: &'a str) -> Self {
        Self {
            path,
            page: 1,
            per_page: 0,
            refresh: false,
        }
    }
}

/// `data` of a listing response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListData {
    /// `null` for empty directories.
    #[serde(default)]
    pub content: Option<Vec<ListEntry>>,
    #[serde(default)]
    pub total: u64,
}

/// One child of a listed directory.
#[derive(Debug, Clone, Deserialize)]
pub struct ListEntry {
    pub name: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub size: u64,
    /// Access token for `/d/...` downloads; empty when signing is disabled.
    #[serde(default)]
    pub sign: Option<String>,
    /// Provider generated preview URL; empty when there is none.
    #[serde(default)]
    pub thumb: Option<String>,
    /// RFC 3339 modification time.
    #[serde(default)]
    pub modified: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_listing() {
        let json = r#"{
            "code": 200,
            "message": "success",
            "data": {
                "content": [
                    {"name": "Action", "is_dir": true, "size": 0, "sign": "", "thumb": "", "modified": "2024-05-01T10:00:00Z"},
                    {"name": "movie.mp4", "is_dir": false, "size": 1024, "sign": "abc:0", "thumb": "https://s.example.com/t?w=200"}
                ],
                "total": 2
            }
        }"#;

        let response: ApiResponse<ListData> = serde_json::from_str(json).unwrap();
        assert!(response.is_ok());
        let content = response.data.unwrap().content.unwrap();
        assert_eq!(content.len(), 2);
        assert!(content[0].is_dir);
        assert_eq!(content[1].sign.as_deref(), Some("abc:0"));
    }

    #[test]
    fn test_deserialize_empty_directory() {
        let json = r#"{"code": 200, "message": "success", "data": {"content": null, "total": 0}}"#;
        let response: ApiResponse<ListData> = serde_json::from_str(json).unwrap();
        assert!(response.data.unwrap().content.is_none());
    }

    #[test]
    fn test_deserialize_failure_without_data() {
        let json = r#"{"code": 500, "message": "object not found", "data": null}"#;
        let response: ApiResponse<ListData> = serde_json::from_str(json).unwrap();
        assert!(!response.is_ok());
        assert!(response.data.is_none());
    }

    #[test]
    fn test_deserialize_envelope_missing_data() {
        let json = r#"{"code": 401, "message": "token is invalidated"}"#;
        let response: ApiResponse<ListEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(response.code, 401);
        assert!(response.data.is_none());
    }

    #[test]
    fn test_list_request_body() {
        let body = serde_json::to_value(ListRequest::all("/media")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"path": "/media", "page": 1, "per_page": 0, "refresh": false})
        );
    }
}
