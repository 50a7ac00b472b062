//! Closed error taxonomy for the generation pipeline.
//!
//! Every variant corresponds to one stable machine code from the closed set
//! described by the system's error handling design. New codes require
//! extending this enum, not inventing ad-hoc strings elsewhere.

use thiserror::Error;

/// One stage of the generation pipeline, used to tag errors and progress
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Normalize,
    Validate,
    Map,
    Render,
    Write,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Normalize => "normalize",
            Stage::Validate => "validate",
            Stage::Map => "map",
            Stage::Render => "render",
            Stage::Write => "write",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // --- File ---
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("file too large: {size} bytes exceeds the {limit} byte cap")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("failed to read file: {0}")]
    FileReadError(String),

    // --- Parse ---
    #[error("failed to parse document: {0}")]
    ParsingError(String),
    #[error("unsupported OpenAPI version: {0} (only 3.0+ is supported)")]
    UnsupportedOpenApiVersion(String),
    #[error("external $ref is not supported: {0}")]
    ExternalRefUnsupported(String),

    // --- Network ---
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("network request timed out after {0:?}")]
    NetworkTimeout(std::time::Duration),
    #[error("refused to fetch a loopback/private-network host: {0}")]
    SsrfBlocked(String),

    // --- Spec ---
    #[error("spec validation error: {0}")]
    SpecValidationError(String),
    #[error("duplicate operationId: {0}")]
    DuplicateOperationId(String),
    #[error("empty schema definition: {0}")]
    EmptySchema(String),
    #[error("empty security scheme definition: {0}")]
    EmptySecurityScheme(String),
    #[error("required property `{property}` is missing from schema `{schema}`")]
    MissingRequiredProperty { schema: String, property: String },

    // --- Template ---
    #[error("template uses a forbidden function: {0}")]
    ForbiddenFunction(String),
    #[error("template failed a security check: {0}")]
    SecurityError(String),
    #[error("template has unbalanced delimiters at byte {0}")]
    UnbalancedDelimiters(usize),
    #[error("template execution failed: {0}")]
    ExecutionError(String),

    // --- Output ---
    #[error("output directory already exists: {0}")]
    OutputExists(String),
    #[error("failed to write output: {0}")]
    WriteError(String),
    #[error("atomic rename failed: {0}")]
    AtomicRenameFailed(String),

    // --- Lifecycle ---
    #[error("a generation job is already in progress for project {0}")]
    GenerationInProgress(String),
    #[error("job was cancelled")]
    Cancelled,
    #[error("stage `{stage}` timed out after {elapsed:?}")]
    Timeout { stage: Stage, elapsed: std::time::Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The stable, SHOUTING_SNAKE_CASE machine code for this error, matching
    /// the closed diagnostic code set.
    pub fn code(&self) -> &'static str {
        match self {
            Error::FileNotFound(_) => "FILE_NOT_FOUND",
            Error::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Error::FileReadError(_) => "FILE_READ_ERROR",
            Error::ParsingError(_) => "PARSING_ERROR",
            Error::UnsupportedOpenApiVersion(_) => "UNSUPPORTED_OPENAPI_VERSION",
            Error::ExternalRefUnsupported(_) => "EXTERNAL_REF_UNSUPPORTED",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::NetworkError(_) => "NETWORK_ERROR",
            Error::NetworkTimeout(_) => "NETWORK_TIMEOUT",
            Error::SsrfBlocked(_) => "SSRF_BLOCKED",
            Error::SpecValidationError(_) => "SPEC_VALIDATION_ERROR",
            Error::DuplicateOperationId(_) => "DUPLICATE_OPERATION_ID",
            Error::EmptySchema(_) => "EMPTY_SCHEMA",
            Error::EmptySecurityScheme(_) => "EMPTY_SECURITY_SCHEME",
            Error::MissingRequiredProperty { .. } => "MISSING_REQUIRED_PROPERTY",
            Error::ForbiddenFunction(_) => "FORBIDDEN_FUNCTION",
            Error::SecurityError(_) => "SECURITY_ERROR",
            Error::UnbalancedDelimiters(_) => "UNBALANCED_DELIMITERS",
            Error::ExecutionError(_) => "EXECUTION_ERROR",
            Error::OutputExists(_) => "OUTPUT_EXISTS",
            Error::WriteError(_) => "WRITE_ERROR",
            Error::AtomicRenameFailed(_) => "ATOMIC_RENAME_FAILED",
            Error::GenerationInProgress(_) => "GENERATION_IN_PROGRESS",
            Error::Cancelled => "CANCELLED",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Io(_) => "FILE_READ_ERROR",
            Error::Json(_) => "PARSING_ERROR",
        }
    }

    /// Structured form surfaced to callers: no stack traces, just
    /// `{code, message, stage, pointer?, suggestions}`.
    pub fn to_diagnostic(&self, stage: Stage) -> ErrorDiagnostic {
        ErrorDiagnostic {
            code: self.code().to_string(),
            message: self.to_string(),
            stage,
            pointer: None,
            suggestions: self.suggestions(),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Error::UnsupportedOpenApiVersion(_) => {
                vec!["Convert the document to OpenAPI 3.0 or later before retrying.".to_string()]
            }
            Error::FileTooLarge { limit, .. } => {
                vec![format!("Reduce the document below {limit} bytes or split it.")]
            }
            Error::SsrfBlocked(_) => {
                vec!["Opt in via configuration if fetching internal hosts is intentional.".to_string()]
            }
            _ => Vec::new(),
        }
    }
}

/// Structured error payload surfaced across the Core API boundary.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorDiagnostic {
    pub code: String,
    pub message: String,
    pub stage: Stage,
    pub pointer: Option<String>,
    pub suggestions: Vec<String>,
}
