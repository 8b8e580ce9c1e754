//! Shape checks applied to client input before it reaches the registry.

use crate::error::CoordinatorError;
use crate::room::CapacityBounds;
use discuss_protocol::{
    PeerId, MAX_CHAT_LEN, MAX_DISPLAY_NAME_LEN, MAX_PEER_ID_LEN, MAX_ROOM_NAME_LEN, MIN_CAPACITY,
};

fn invalid(reason: &str) -> CoordinatorError {
    CoordinatorError::InvalidInput(reason.to_string())
}

/// Trimmed, non-empty, bounded room name.
pub fn room_name(name: &str) -> Result<String, CoordinatorError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("room name is empty"));
    }
    if name.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(invalid("room name too long"));
    }
    Ok(name.to_string())
}

/// Clamp a requested capacity into `[MIN_CAPACITY, bounds.max]`.
pub fn capacity(requested: Option<i64>, bounds: CapacityBounds) -> u32 {
    let min = i64::from(MIN_CAPACITY);
    let max = i64::from(bounds.max.max(MIN_CAPACITY));
    let requested = requested.unwrap_or(i64::from(bounds.default));
    requested.clamp(min, max) as u32
}

/// An empty password is no password.
pub fn password(password: &str) -> Option<&str> {
    if password.is_empty() {
        None
    } else {
        Some(password)
    }
}

pub fn peer_id(peer_id: &PeerId) -> Result<(), CoordinatorError> {
    if peer_id.0.trim().is_empty() {
        return Err(invalid("peer id is empty"));
    }
    if peer_id.0.chars().count() > MAX_PEER_ID_LEN {
        return Err(invalid("peer id too long"));
    }
    Ok(())
}

/// Display names may be empty or duplicated; only length is bounded.
pub fn display_name(name: &str) -> Result<String, CoordinatorError> {
    let name = name.trim();
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(invalid("display name too long"));
    }
    Ok(name.to_string())
}

pub fn chat_text(text: &str) -> Result<String, CoordinatorError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid("chat text is empty"));
    }
    if text.chars().count() > MAX_CHAT_LEN {
        return Err(invalid("chat text too long"));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use discuss_protocol::{DEFAULT_CAPACITY, MAX_CAPACITY};

    #[test]
    fn capacity_clamps_into_range() {
        let bounds = CapacityBounds::default();
        assert_eq!(capacity(Some(0), bounds), MIN_CAPACITY);
        assert_eq!(capacity(Some(1), bounds), MIN_CAPACITY);
        assert_eq!(capacity(Some(6), bounds), 6);
        assert_eq!(capacity(Some(11), bounds), MAX_CAPACITY);
        assert_eq!(capacity(None, bounds), DEFAULT_CAPACITY);
    }

    #[test]
    fn capacity_honors_lowered_max() {
        let bounds = CapacityBounds { default: 4, max: 4 };
        assert_eq!(capacity(Some(8), bounds), 4);
        assert_eq!(capacity(None, bounds), 4);
    }

    #[test]
    fn room_name_is_trimmed() {
        assert_eq!(room_name("  Late Night  ").unwrap(), "Late Night");
        assert!(room_name("").is_err());
        assert!(room_name(&"x".repeat(MAX_ROOM_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn display_name_may_be_empty() {
        assert_eq!(display_name("").unwrap(), "");
        assert!(display_name(&"y".repeat(MAX_DISPLAY_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn peer_id_must_be_present() {
        assert!(peer_id(&PeerId::from(" ")).is_err());
        assert!(peer_id(&PeerId::from("abc")).is_ok());
    }

    #[test]
    fn chat_text_rejects_blank() {
        assert!(chat_text("   ").is_err());
        assert_eq!(chat_text(" hi ").unwrap(), "hi");
        assert!(chat_text(&"z".repeat(MAX_CHAT_LEN + 1)).is_err());
    }
}
