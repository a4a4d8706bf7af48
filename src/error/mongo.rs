use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured view of a driver error.
///
/// Serialized to JSON when a driver failure is displayed, so log lines carry
/// the server error code and its name instead of the driver's Debug output.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) key: Option<bson::Document>,
}

impl ErrorInfo {
    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Write a driver error as single-line JSON wrapped in an `error` field.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let wrapper = serde_json::json!({ "error": extract_error_info(error) });
    let json_output = serde_json::to_string(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "{json_output}")
}

/// Extract structured information from a driver error using its typed kinds.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::{ErrorKind, WriteFailure};

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Write(write_failure) => {
            info.error_type = Some("mongo.write_error".to_string());

            match write_failure {
                WriteFailure::WriteError(write_error) => {
                    info.code = Some(write_error.code);
                    info.message = Some(write_error.message.clone());
                    info.key = duplicate_key(&write_error.details);
                }
                WriteFailure::WriteConcernError(wc_error) => {
                    info.code = Some(wc_error.code);
                    info.message = Some(wc_error.message.clone());
                }
                _ => {}
            }
        }
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
        }
        ErrorKind::InsertMany(insert_error) => {
            info.error_type = Some("mongo.insert_many_error".to_string());

            if let Some(first_error) = insert_error.write_errors.as_ref().and_then(|e| e.first()) {
                info.code = Some(first_error.code);
                info.message = Some(first_error.message.clone());
                info.key = duplicate_key(&first_error.details);
            } else if let Some(wc_error) = &insert_error.write_concern_error {
                info.code = Some(wc_error.code);
                info.message = Some(wc_error.message.clone());
            }
        }
        ErrorKind::BulkWrite(bulk_error) => {
            info.error_type = Some("mongo.bulk_write_error".to_string());
            info.message = Some(format!("{bulk_error:?}"));
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info.name = info.code.and_then(error_name);
    info
}

/// Human-readable name for the server error codes callers most often branch on.
fn error_name(code: i32) -> Option<String> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        50 => "MaxTimeMSExpired",
        59 => "CommandNotFound",
        121 => "DocumentValidationFailure",
        _ => return None,
    };

    Some(name.to_string())
}

fn duplicate_key(details: &Option<bson::Document>) -> Option<bson::Document> {
    let doc = details.as_ref()?;
    doc.get_document("keyValue")
        .or_else(|_| doc.get_document("keyPattern"))
        .ok()
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_error_names() {
        assert_eq!(error_name(11000).as_deref(), Some("DuplicateKey"));
        assert_eq!(error_name(18).as_deref(), Some("AuthenticationFailed"));
        assert_eq!(error_name(424242), None);
    }

    #[test]
    fn test_duplicate_key_prefers_key_value() {
        let details = Some(doc! {
            "keyPattern": { "email": 1 },
            "keyValue": { "email": "a@example.com" },
        });
        assert_eq!(
            duplicate_key(&details),
            Some(doc! { "email": "a@example.com" })
        );
        assert_eq!(duplicate_key(&None), None);
    }

    #[test]
    fn test_compact_json_skips_empty_fields() {
        let info = ErrorInfo {
            code: Some(26),
            name: Some("NamespaceNotFound".to_string()),
            ..ErrorInfo::default()
        };
        assert_eq!(
            info.to_json_compact().unwrap(),
            r#"{"code":26,"name":"NamespaceNotFound"}"#
        );
    }
}
