// Shared utilities

pub mod auth_errors;
pub mod password;
pub mod service_error;
pub mod validation;

pub use auth_errors::AuthError;
pub use service_error::ServiceError;
