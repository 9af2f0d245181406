use serde::{Deserialize, Serialize};

/// An external delivery channel. Superset adopted per the spec's Design
/// Notes: the richer of the two source `ChannelType` variants, including
/// LinkedIn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    WhatsApp,
    Facebook,
    Instagram,
    LinkedIn,
    Email,
    Sms,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 6] = [
        ChannelKind::WhatsApp,
        ChannelKind::Facebook,
        ChannelKind::Instagram,
        ChannelKind::LinkedIn,
        ChannelKind::Email,
        ChannelKind::Sms,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::WhatsApp => "whatsapp",
            ChannelKind::Facebook => "facebook",
            ChannelKind::Instagram => "instagram",
            ChannelKind::LinkedIn => "linkedin",
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "whatsapp" => Some(ChannelKind::WhatsApp),
            "facebook" => Some(ChannelKind::Facebook),
            "instagram" => Some(ChannelKind::Instagram),
            "linkedin" => Some(ChannelKind::LinkedIn),
            "email" => Some(ChannelKind::Email),
            "sms" => Some(ChannelKind::Sms),
            _ => None,
        }
    }

    /// Whether this channel's adapter requires `recipient_ref` to be set.
    pub fn requires_recipient_ref(self) -> bool {
        matches!(self, ChannelKind::WhatsApp | ChannelKind::Email | ChannelKind::Sms)
    }

    /// Whether this channel's adapter requires `media_ref` to be set.
    pub fn requires_media_ref(self) -> bool {
        matches!(self, ChannelKind::Instagram)
    }

    /// Short human-readable description, used by `ListChannelKinds`.
    pub fn description(self) -> &'static str {
        match self {
            ChannelKind::WhatsApp => "WhatsApp Business API message (text or image+caption)",
            ChannelKind::Facebook => "Facebook Page post (text or photo)",
            ChannelKind::Instagram => "Instagram post; requires an image media reference",
            ChannelKind::LinkedIn => "LinkedIn organization post; professional tone expected",
            ChannelKind::Email => "Email with plain-text and HTML bodies",
            ChannelKind::Sms => "SMS message; media reference appended as a URL",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parse_round_trips_every_variant() {
        for kind in ChannelKind::ALL {
            assert_eq!(ChannelKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unit_parse_is_case_insensitive() {
        assert_eq!(ChannelKind::parse("WhatsApp"), Some(ChannelKind::WhatsApp));
        assert_eq!(ChannelKind::parse(" sms "), Some(ChannelKind::Sms));
    }

    #[test]
    fn unit_parse_rejects_unknown_channel() {
        assert_eq!(ChannelKind::parse("telegram"), None);
    }

    #[test]
    fn unit_serde_uses_snake_case() {
        let json = serde_json::to_string(&ChannelKind::LinkedIn).unwrap();
        assert_eq!(json, "\"linkedin\"");
    }
}
