//! Google Drive API v3 wire types.

use serde::{Deserialize, Serialize};

/// Google Drive API file resource
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Bytes, encoded as a decimal string; omitted for folders and Google Docs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    /// Present when more pages exist; only the first page is consumed
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Metadata part of a resumable create.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest<'a> {
    pub name: &'a str,
    pub mime_type: &'a str,
}

/// Google Drive API about.get response with `fields=user`
#[derive(Debug, Deserialize)]
pub struct AboutResponse {
    pub user: AboutUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutUser {
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Error envelope returned with non-success statuses.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<u16>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_drive_file() {
        let json = r#"{
            "id": "1a2b",
            "name": "report.pdf",
            "mimeType": "application/pdf",
            "size": "20480",
            "modifiedTime": "2024-03-01T12:30:00.000Z"
        }"#;

        let file: DriveFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.id, "1a2b");
        assert_eq!(file.size.as_deref(), Some("20480"));
        assert_eq!(file.mime_type.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn test_deserialize_google_doc_without_size() {
        let json = r#"{"id": "doc", "name": "Notes", "mimeType": "application/vnd.google-apps.document"}"#;

        let file: DriveFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.size, None);
        assert_eq!(file.modified_time, None);
    }

    #[test]
    fn test_deserialize_files_list() {
        let json = r#"{"nextPageToken": "tok", "files": [{"id": "1", "name": "a"}]}"#;

        let list: FilesListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(list.files.len(), 1);
        assert_eq!(list.next_page_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_serialize_create_request() {
        let body = serde_json::to_string(&CreateFileRequest {
            name: "photo.png",
            mime_type: "image/png",
        })
        .unwrap();

        assert_eq!(body, r#"{"name":"photo.png","mimeType":"image/png"}"#);
    }

    #[test]
    fn test_deserialize_error_envelope() {
        let json = r#"{"error": {"code": 404, "message": "File not found: abc.", "errors": []}}"#;

        let error: ErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(error.error.code, Some(404));
        assert_eq!(error.error.message, "File not found: abc.");
    }
}
