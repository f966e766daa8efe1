use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("download.max_concurrent_children must be at least 1")]
    ZeroConcurrency,

    #[error("tool.command must not be empty")]
    EmptyToolCommand,

    #[error("Timeout must be positive: {field} = 0")]
    ZeroTimeout { field: String },

    #[error("max_payload_bytes ({actual}) exceeds limit of 5MB ({limit})")]
    PayloadSizeExceedsLimit { actual: u64, limit: u64 },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_download(config)?;
    validate_tool(config)?;
    validate_payload_size(config)?;
    Ok(())
}

fn validate_download(config: &Config) -> Result<(), ValidationError> {
    if config.download.max_concurrent_children == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }

    if config.download.probe_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "probe_timeout_secs".to_string(),
        });
    }

    if config.download.fetch_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "fetch_timeout_secs".to_string(),
        });
    }

    Ok(())
}

fn validate_tool(config: &Config) -> Result<(), ValidationError> {
    if config.tool.command.trim().is_empty() {
        return Err(ValidationError::EmptyToolCommand);
    }

    Ok(())
}

/// Submit payloads are a single locator plus options, cap the body size hard
fn validate_payload_size(config: &Config) -> Result<(), ValidationError> {
    const MAX_PAYLOAD_BYTES: u64 = 5 * 1024 * 1024; // 5 MB

    if config.server.max_payload_bytes.as_u64() > MAX_PAYLOAD_BYTES {
        return Err(ValidationError::PayloadSizeExceedsLimit {
            actual: config.server.max_payload_bytes.as_u64(),
            limit: MAX_PAYLOAD_BYTES,
        });
    }

    Ok(())
}
