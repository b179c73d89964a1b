//! Engine configuration.

/// Default number of open reports that triggers an automatic ban.
pub const DEFAULT_AUTO_BAN_THRESHOLD: usize = 3;

/// Default maximum appeal description length, in characters.
pub const DEFAULT_MAX_APPEAL_LENGTH: usize = 500;

/// Default maximum report reason length, in characters.
pub const DEFAULT_MAX_REPORT_REASON_LENGTH: usize = 500;

/// Default number of commands buffered per community mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default number of payloads buffered per subscriber before it lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Maximum community name length, in characters.
pub const MAX_COMMUNITY_NAME_LENGTH: usize = 64;

/// Maximum community description length, in characters.
pub const MAX_COMMUNITY_DESCRIPTION_LENGTH: usize = 1000;

/// Governance engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Open, not-yet-actioned reports against one user in one community
    /// that trigger an automatic ban. Zero disables auto-ban.
    pub auto_ban_threshold: usize,
    pub max_appeal_length: usize,
    pub max_report_reason_length: usize,
    pub mailbox_capacity: usize,
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_ban_threshold: DEFAULT_AUTO_BAN_THRESHOLD,
            max_appeal_length: DEFAULT_MAX_APPEAL_LENGTH,
            max_report_reason_length: DEFAULT_MAX_REPORT_REASON_LENGTH,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Reject empty or over-long free text.
pub(crate) fn validate_text(field: &str, value: &str, max_len: usize) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::Error::InvalidInput(format!("{} is required", field)));
    }
    if value.chars().count() > max_len {
        return Err(crate::Error::InvalidInput(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.auto_ban_threshold, 3);
        assert_eq!(config.max_appeal_length, 500);
        assert_eq!(config.mailbox_capacity, 256);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("reason", "spam links", 20).is_ok());
        assert!(validate_text("reason", "   ", 20).is_err());
        assert!(validate_text("reason", &"x".repeat(21), 20).is_err());
        // Length is counted in characters, not bytes
        assert!(validate_text("reason", &"é".repeat(20), 20).is_ok());
    }
}
