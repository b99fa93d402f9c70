use crate::error::CoreError;

pub type TeamId = String;
pub type RoundId = String;

const MAX_ID_LEN: usize = 64;

/// Key of the current market document inside the `simulation` collection.
pub const RESERVED_MARKET_KEY: &str = "market_state";

/// Checks that an identifier is safe to embed in a document key.
///
/// Underscores are rejected because composite keys join team and round ids
/// with `_`.
pub fn validate_id(value: &str) -> Result<(), CoreError> {
    let invalid = |reason: &str| CoreError::InvalidId {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.len() > MAX_ID_LEN {
        return Err(invalid("longer than 64 characters"));
    }
    if value == RESERVED_MARKET_KEY {
        return Err(invalid("reserved"));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
    {
        return Err(invalid(&format!("unsupported character {:?}", c)));
    }
    Ok(())
}

/// Document key for per-team, per-round documents.
pub fn team_round_key(team_id: &str, round_id: &str) -> String {
    format!("{}_{}", team_id, round_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(validate_id("T1").is_ok());
        assert!(validate_id("2025-fall.1").is_ok());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(validate_id("").is_err());
        assert!(validate_id("team_1").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id(RESERVED_MARKET_KEY).is_err());
        assert!(validate_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_team_round_key() {
        assert_eq!(team_round_key("T1", "2025-S1"), "T1_2025-S1");
    }
}
