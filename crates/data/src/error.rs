use thiserror::Error;

/// Errors surfaced by a [`crate::adapter::StorageAdapter`] implementation.
///
/// These map onto the error kinds of the wire protocol: `Conflict` is
/// swallowed by callers that treat re-registration as idempotent,
/// `CapacityExceeded` and `NotFound` are fatal to the request, and
/// `Backend`/`Io` are transient and safe to retry.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("user cap exceeded")]
    CapacityExceeded,

    #[error("no devices registered for user")]
    NotFound,

    #[error("device already registered")]
    Conflict,

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type DataResult<T> = Result<T, DataError>;

#[cfg(any(feature = "postgres", feature = "sqlite"))]
impl From<diesel::result::Error> for DataError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};
        match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => DataError::Conflict,
            DieselError::NotFound => DataError::NotFound,
            other => DataError::Backend(other.to_string()),
        }
    }
}

impl From<crate::db::PoolError> for DataError {
    fn from(e: crate::db::PoolError) -> Self {
        DataError::Backend(format!("connection pool: {e}"))
    }
}

impl From<aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>> for DataError {
    fn from(e: aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>) -> Self {
        DataError::Backend(e.to_string())
    }
}

impl From<aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::put_object::PutObjectError>> for DataError {
    fn from(e: aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::put_object::PutObjectError>) -> Self {
        DataError::Backend(e.to_string())
    }
}

impl From<aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::delete_object::DeleteObjectError>> for DataError {
    fn from(e: aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::delete_object::DeleteObjectError>) -> Self {
        DataError::Backend(e.to_string())
    }
}

impl From<aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Error>> for DataError {
    fn from(e: aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Error>) -> Self {
        DataError::Backend(e.to_string())
    }
}
