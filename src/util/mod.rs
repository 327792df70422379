//! Small helpers shared across modules.
//!
//! - **URL validation**: scheme and host checks for configured endpoints

mod url_validator;

pub use url_validator::{validate_endpoint_url, UrlValidationError};
