//! Validation of client-supplied strings.

use crate::ProtocolError;

pub const MAX_PLAYER_NAME_LEN: usize = 15;
pub const MAX_PLAYER_ID_LEN: usize = 36;

/// Trim and length-check a display name.
pub fn validate_player_name(value: &str) -> Result<String, ProtocolError> {
    let name = value.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_PLAYER_NAME_LEN {
        return Err(ProtocolError::InvalidPlayerName);
    }
    Ok(name.to_string())
}

/// Length-check an identity token supplied on reconnect.
pub fn validate_player_id(value: &str) -> Result<String, ProtocolError> {
    let len = value.chars().count();
    if len == 0 || len > MAX_PLAYER_ID_LEN {
        return Err(ProtocolError::InvalidPlayerId);
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_trimmed() {
        assert_eq!(validate_player_name("  viper ").unwrap(), "viper");
    }

    #[test]
    fn test_name_length_bounds() {
        assert!(validate_player_name("   ").is_err());
        assert!(validate_player_name("abcdefghijklmno").is_ok());
        assert!(validate_player_name("abcdefghijklmnop").is_err());
    }

    #[test]
    fn test_id_length_bounds() {
        assert!(validate_player_id("").is_err());
        assert!(validate_player_id("2f1b6c0e-8d4c-4e2b-9a51-0c5d3f7e9b11").is_ok());
        assert!(validate_player_id(&"a".repeat(37)).is_err());
    }
}
