//! # Validation Module
//!
//! Input validation for session parameters.
//!
//! ## Usage
//! ```rust
//! use braid_core::validation::{validate_workspace_id, validate_relay_address};
//!
//! validate_workspace_id("team-notes").unwrap();
//! validate_relay_address("wss://relay.example.com").unwrap();
//! assert!(validate_relay_address("http://relay.example.com").is_err());
//! ```

use crate::error::ValidationError;
use crate::MAX_WORKSPACE_ID_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a workspace identifier.
///
/// ## Rules
/// - Must not be empty (after trimming)
/// - At most [`MAX_WORKSPACE_ID_LEN`] characters
/// - No `/`, `?` or `#`, since it becomes a URL path segment and a file name
pub fn validate_workspace_id(workspace: &str) -> ValidationResult<()> {
    let trimmed = workspace.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "workspace".to_string(),
        });
    }

    if trimmed.len() > MAX_WORKSPACE_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "workspace".to_string(),
            max: MAX_WORKSPACE_ID_LEN,
        });
    }

    if trimmed
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '?' | '#') || c.is_control())
    {
        return Err(ValidationError::InvalidFormat {
            field: "workspace".to_string(),
            reason: "must not contain '/', '\\', '?', '#' or control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates a relay backend address.
///
/// ## Rules
/// - Must not be empty
/// - Must start with `ws://` or `wss://`
pub fn validate_relay_address(address: &str) -> ValidationResult<()> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ValidationError::Required {
            field: "backend_address".to_string(),
        });
    }

    if !address.starts_with("ws://") && !address.starts_with("wss://") {
        return Err(ValidationError::InvalidFormat {
            field: "backend_address".to_string(),
            reason: format!("must start with ws:// or wss://, got: {}", address),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_id() {
        assert!(validate_workspace_id("test").is_ok());
        assert!(validate_workspace_id("  ").is_err());
        assert!(validate_workspace_id("a/b").is_err());
        assert!(validate_workspace_id(&"w".repeat(MAX_WORKSPACE_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_relay_address() {
        assert!(validate_relay_address("ws://localhost:3000").is_ok());
        assert!(validate_relay_address("wss://relay.example.com/sync").is_ok());
        assert!(matches!(
            validate_relay_address(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_relay_address("https://relay.example.com"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }
}
