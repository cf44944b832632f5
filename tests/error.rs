use std::path::PathBuf;

use serde_json::Value;
use stageboard::error::{exit_codes, Error, JsonError};
use stageboard::store::StoreError;

#[test]
fn exit_code_user_error() {
    for err in [
        Error::InvalidArgument("bad input".to_string()),
        Error::TaskNotFound("t9".to_string()),
        Error::UnknownStage("archived".to_string()),
        Error::DragInFlight("t1".to_string()),
    ] {
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR, "{err}");
    }
}

#[test]
fn exit_code_operation_failed() {
    let rejected = Error::WriteRejected {
        task_id: "t1".to_string(),
        source: StoreError::PermissionDenied("read only".to_string()),
    };
    assert_eq!(rejected.exit_code(), exit_codes::OPERATION_FAILED);
    assert_eq!(
        Error::LockFailed(PathBuf::from("tasks.json.lock")).exit_code(),
        exit_codes::OPERATION_FAILED
    );
    assert_eq!(
        Error::BoardUnavailable("offline".to_string()).exit_code(),
        exit_codes::OPERATION_FAILED
    );
}

#[test]
fn move_failures_are_transient() {
    let timeout = Error::WriteTimeout {
        task_id: "t1".to_string(),
        timeout_ms: 5000,
    };
    assert!(timeout.is_transient_move_failure());
    assert!(timeout.to_string().contains("5000ms"));
    assert!(!Error::BoardUnavailable("offline".to_string()).is_transient_move_failure());
}

#[test]
fn details_include_store_error() {
    let err = Error::WriteRejected {
        task_id: "t1".to_string(),
        source: StoreError::PermissionDenied("read only".to_string()),
    };
    let details = err.details().expect("details");
    assert_eq!(details["task_id"], Value::String("t1".to_string()));
    assert_eq!(
        details["store_error"],
        Value::String("permission denied: read only".to_string())
    );
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn json_error_includes_details() {
    let err = Error::UnknownStage("archived".to_string());
    let json = JsonError::from(&err);
    assert_eq!(json.code, exit_codes::USER_ERROR);
    assert!(json.error.contains("Unknown stage"));
    let value = serde_json::to_value(&json).expect("serialize");
    assert_eq!(value["details"]["stage_id"], Value::String("archived".to_string()));
}

#[test]
fn json_error_omits_missing_details() {
    let err = Error::InvalidConfig("bad config".to_string());
    let value = serde_json::to_value(JsonError::from(&err)).expect("serialize");
    assert!(value.get("details").is_none());
}
