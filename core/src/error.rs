use std::collections::HashMap;

use prost::Message;
use thiserror::Error;

use crate::platform::PlatformError;
use macos_use_proto::google::rpc::ErrorInfo;
use macos_use_proto::google::rpc::Status as RpcStatus;

pub type Result<T> = std::result::Result<T, AutomationError>;

/// Domain carried by every `google.rpc.ErrorInfo` this server emits.
pub const ERROR_DOMAIN: &str = "macosusesdk.com";

/// Stable machine-readable failure identifiers. Clients are expected to
/// branch on these, never on message text.
pub mod reason {
    // Resource names and request shape.
    pub const INVALID_RESOURCE_NAME: &str = "INVALID_RESOURCE_NAME";
    pub const INVALID_PAGE_TOKEN: &str = "INVALID_PAGE_TOKEN";
    pub const REQUIRED_FIELD_MISSING: &str = "REQUIRED_FIELD_MISSING";
    pub const INVALID_DIMENSION: &str = "INVALID_DIMENSION";
    pub const INVALID_COORDINATE: &str = "INVALID_COORDINATE";
    pub const INVALID_UPDATE_MASK_PATH: &str = "INVALID_UPDATE_MASK_PATH";
    pub const INVALID_SELECTOR: &str = "INVALID_SELECTOR";
    pub const INVALID_ACTION: &str = "INVALID_ACTION";
    pub const INVALID_ENUM_VALUE: &str = "INVALID_ENUM_VALUE";
    pub const NOT_A_DIRECTORY: &str = "NOT_A_DIRECTORY";

    // Not-found, per resource.
    pub const APPLICATION_NOT_FOUND: &str = "APPLICATION_NOT_FOUND";
    pub const WINDOW_NOT_FOUND: &str = "WINDOW_NOT_FOUND";
    pub const DISPLAY_NOT_FOUND: &str = "DISPLAY_NOT_FOUND";
    pub const ELEMENT_NOT_FOUND: &str = "ELEMENT_NOT_FOUND";
    pub const INPUT_NOT_FOUND: &str = "INPUT_NOT_FOUND";
    pub const OBSERVATION_NOT_FOUND: &str = "OBSERVATION_NOT_FOUND";
    pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
    pub const MACRO_NOT_FOUND: &str = "MACRO_NOT_FOUND";
    pub const OPERATION_NOT_FOUND: &str = "OPERATION_NOT_FOUND";
    pub const CLIPBOARD_NOT_FOUND: &str = "CLIPBOARD_NOT_FOUND";

    // Preconditions.
    pub const ELEMENT_WITHOUT_BOUNDS: &str = "ELEMENT_WITHOUT_BOUNDS";
    pub const AMBIGUOUS_WINDOW_MATCH: &str = "AMBIGUOUS_WINDOW_MATCH";
    pub const SESSION_NOT_ACTIVE: &str = "SESSION_NOT_ACTIVE";
    pub const NO_ACTIVE_TRANSACTION: &str = "NO_ACTIVE_TRANSACTION";
    pub const TRANSACTION_MISMATCH: &str = "TRANSACTION_MISMATCH";
    pub const UNKNOWN_REVISION: &str = "UNKNOWN_REVISION";
    pub const NO_CLOSE_BUTTON: &str = "NO_CLOSE_BUTTON";

    // Permissions.
    pub const ACCESSIBILITY_PERMISSION_DENIED: &str = "ACCESSIBILITY_PERMISSION_DENIED";
    pub const FILE_PERMISSION_DENIED: &str = "FILE_PERMISSION_DENIED";
    pub const SECURITY_VIOLATION: &str = "SECURITY_VIOLATION";

    // Internal.
    pub const PLATFORM_FAILURE: &str = "PLATFORM_FAILURE";
    pub const PLATFORM_UNSUPPORTED: &str = "PLATFORM_UNSUPPORTED";
    pub const TIMEOUT: &str = "TIMEOUT";

    // Cancellation.
    pub const OPERATION_CANCELLED: &str = "OPERATION_CANCELLED";
}

/// The single error currency of the core. Every variant maps onto one gRPC
/// code and carries a stable reason plus optional structured metadata; the
/// conversion to [`tonic::Status`] packs those into the
/// `grpc-status-details-bin` trailer as `google.rpc.Status` with one
/// `ErrorInfo` detail.
#[derive(Error, Debug, Clone)]
pub enum AutomationError {
    #[error("{message}")]
    InvalidArgument {
        reason: &'static str,
        message: String,
        metadata: HashMap<String, String>,
    },

    #[error("{resource_type} not found: {name}")]
    NotFound {
        reason: &'static str,
        resource_type: &'static str,
        name: String,
    },

    #[error("{message}")]
    FailedPrecondition {
        reason: &'static str,
        message: String,
    },

    #[error("{message}")]
    PermissionDenied {
        reason: &'static str,
        message: String,
    },

    #[error("{message}")]
    Internal {
        reason: &'static str,
        message: String,
        metadata: HashMap<String, String>,
    },

    #[error("cancelled: {message}")]
    Cancelled { message: String },
}

impl AutomationError {
    pub fn invalid_argument(reason: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn invalid_argument_with(
        reason: &'static str,
        message: impl Into<String>,
        metadata: impl IntoIterator<Item = (&'static str, String)>,
    ) -> Self {
        Self::InvalidArgument {
            reason,
            message: message.into(),
            metadata: metadata
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Invalid-argument for a malformed resource name, carrying the
    /// `{resourceType, value, expectedFormat}` metadata contract.
    pub fn invalid_resource_name(
        resource_type: &'static str,
        value: &str,
        expected_format: &'static str,
    ) -> Self {
        Self::invalid_argument_with(
            reason::INVALID_RESOURCE_NAME,
            format!("invalid {resource_type} resource name {value:?}, expected {expected_format}"),
            [
                ("resourceType", resource_type.to_string()),
                ("value", value.to_string()),
                ("expectedFormat", expected_format.to_string()),
            ],
        )
    }

    pub fn invalid_page_token(value: &str) -> Self {
        Self::invalid_argument_with(
            reason::INVALID_PAGE_TOKEN,
            format!("invalid page token {value:?}"),
            [("value", value.to_string())],
        )
    }

    pub fn required_field(field: &'static str) -> Self {
        Self::invalid_argument_with(
            reason::REQUIRED_FIELD_MISSING,
            format!("required field {field} is missing"),
            [("field", field.to_string())],
        )
    }

    pub fn not_found(
        reason: &'static str,
        resource_type: &'static str,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            reason,
            resource_type,
            name: name.into(),
        }
    }

    pub fn failed_precondition(reason: &'static str, message: impl Into<String>) -> Self {
        Self::FailedPrecondition {
            reason,
            message: message.into(),
        }
    }

    pub fn permission_denied(reason: &'static str, message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason,
            message: message.into(),
        }
    }

    pub fn internal(reason: &'static str, message: impl Into<String>) -> Self {
        Self::Internal {
            reason,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn internal_with(
        reason: &'static str,
        message: impl Into<String>,
        metadata: impl IntoIterator<Item = (&'static str, String)>,
    ) -> Self {
        Self::Internal {
            reason,
            message: message.into(),
            metadata: metadata
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    pub fn code(&self) -> tonic::Code {
        match self {
            Self::InvalidArgument { .. } => tonic::Code::InvalidArgument,
            Self::NotFound { .. } => tonic::Code::NotFound,
            Self::FailedPrecondition { .. } => tonic::Code::FailedPrecondition,
            Self::PermissionDenied { .. } => tonic::Code::PermissionDenied,
            Self::Internal { .. } => tonic::Code::Internal,
            Self::Cancelled { .. } => tonic::Code::Cancelled,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidArgument { reason, .. } => reason,
            Self::NotFound { reason, .. } => reason,
            Self::FailedPrecondition { reason, .. } => reason,
            Self::PermissionDenied { reason, .. } => reason,
            Self::Internal { reason, .. } => reason,
            Self::Cancelled { .. } => reason::OPERATION_CANCELLED,
        }
    }

    fn metadata(&self) -> HashMap<String, String> {
        match self {
            Self::InvalidArgument { metadata, .. } | Self::Internal { metadata, .. } => {
                metadata.clone()
            }
            Self::NotFound {
                resource_type,
                name,
                ..
            } => HashMap::from([
                ("resourceType".to_string(), resource_type.to_string()),
                ("name".to_string(), name.clone()),
            ]),
            _ => HashMap::new(),
        }
    }

    /// The `google.rpc.Status` proto equivalent of this error, used both for
    /// the status trailer and for failing long-running operations.
    pub fn to_rpc_status(&self) -> RpcStatus {
        let error_info = ErrorInfo {
            reason: self.reason().to_string(),
            domain: ERROR_DOMAIN.to_string(),
            metadata: self.metadata(),
        };
        RpcStatus {
            code: self.code() as i32,
            message: self.to_string(),
            details: vec![prost_types::Any {
                type_url: "type.googleapis.com/google.rpc.ErrorInfo".to_string(),
                value: error_info.encode_to_vec(),
            }],
        }
    }
}

impl From<AutomationError> for tonic::Status {
    fn from(err: AutomationError) -> Self {
        let details = err.to_rpc_status().encode_to_vec();
        tonic::Status::with_details(err.code(), err.to_string(), details.into())
    }
}

impl From<PlatformError> for AutomationError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::PermissionDenied(message) => {
                Self::permission_denied(reason::ACCESSIBILITY_PERMISSION_DENIED, message)
            }
            PlatformError::Timeout(message) => Self::internal(reason::TIMEOUT, message),
            PlatformError::Unsupported(what) => Self::internal(
                reason::PLATFORM_UNSUPPORTED,
                format!("unsupported on this host: {what}"),
            ),
            PlatformError::Failure { code, message } => Self::internal_with(
                reason::PLATFORM_FAILURE,
                message,
                [("status", code.to_string())],
            ),
            PlatformError::NotFound(what) => Self::internal(
                reason::PLATFORM_FAILURE,
                format!("platform object not found: {what}"),
            ),
            PlatformError::Io(err) => Self::internal(reason::PLATFORM_FAILURE, err.to_string()),
        }
    }
}
