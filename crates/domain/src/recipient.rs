//! Recipient identifiers and the normalizer that turns operator input into
//! them.
//!
//! Normalization never rejects malformed input: anything that survives
//! trimming is passed through and the transport's send failure is the
//! validation signal.

use serde::{Deserialize, Serialize};

use crate::config::BroadcastConfig;

/// A broadcast target. The identifier is either bare (a phone number or group
/// id) or already qualified (contains `@`) and used verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    User(String),
    Group(String),
}

impl Recipient {
    pub fn identifier(&self) -> &str {
        match self {
            Self::User(id) | Self::Group(id) => id,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    pub fn is_qualified(&self) -> bool {
        self.identifier().contains('@')
    }
}

/// Whether a start request addresses individual users or groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    #[default]
    Users,
    Groups,
}

impl TargetMode {
    /// Accepts `users`/`groups` (any case) and the legacy menu values `1`/`2`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "users" | "user" | "1" => Some(Self::Users),
            "groups" | "group" | "2" => Some(Self::Groups),
            _ => None,
        }
    }
}

/// Split comma-separated operator input, trimming and dropping empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Canonicalizes raw recipient text using the configured country code and
/// address suffixes.
#[derive(Debug, Clone)]
pub struct TargetNormalizer {
    country_code: String,
    user_suffix: String,
    group_suffix: String,
}

impl Default for TargetNormalizer {
    fn default() -> Self {
        Self::from_config(&BroadcastConfig::default())
    }
}

impl TargetNormalizer {
    pub fn new(
        country_code: impl Into<String>,
        user_suffix: impl Into<String>,
        group_suffix: impl Into<String>,
    ) -> Self {
        Self {
            country_code: country_code.into(),
            user_suffix: user_suffix.into(),
            group_suffix: group_suffix.into(),
        }
    }

    pub fn from_config(cfg: &BroadcastConfig) -> Self {
        Self::new(
            cfg.default_country_code.clone(),
            cfg.user_suffix.clone(),
            cfg.group_suffix.clone(),
        )
    }

    pub fn normalize_user(&self, raw: &str) -> Option<Recipient> {
        let trimmed = raw.trim();
        if trimmed.contains('@') {
            return Some(Recipient::User(trimmed.to_owned()));
        }

        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
        let canonical = match digits.len() {
            10 => format!("{}{digits}", self.country_code),
            11 if digits.starts_with('0') => format!("{}{}", self.country_code, &digits[1..]),
            _ => digits,
        };

        if canonical.is_empty() {
            None
        } else {
            Some(Recipient::User(canonical))
        }
    }

    pub fn normalize_group(&self, raw: &str) -> Option<Recipient> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Recipient::Group(trimmed.to_owned()))
        }
    }

    pub fn normalize_users(&self, raw: &str) -> Vec<Recipient> {
        split_list(raw)
            .iter()
            .filter_map(|item| self.normalize_user(item))
            .collect()
    }

    pub fn normalize_groups(&self, raw: &str) -> Vec<Recipient> {
        split_list(raw)
            .iter()
            .filter_map(|item| self.normalize_group(item))
            .collect()
    }

    /// Normalize already-split items according to `mode`.
    pub fn normalize_all<S: AsRef<str>>(&self, mode: TargetMode, items: &[S]) -> Vec<Recipient> {
        items
            .iter()
            .filter_map(|item| match mode {
                TargetMode::Users => self.normalize_user(item.as_ref()),
                TargetMode::Groups => self.normalize_group(item.as_ref()),
            })
            .collect()
    }

    /// Fully-qualified transport address for a recipient.
    pub fn to_address(&self, recipient: &Recipient) -> String {
        if recipient.is_qualified() {
            return recipient.identifier().to_owned();
        }
        match recipient {
            Recipient::User(id) => format!("{id}{}", self.user_suffix),
            Recipient::Group(id) => format!("{id}{}", self.group_suffix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> Option<Recipient> {
        Some(Recipient::User(id.into()))
    }

    #[test]
    fn ten_digits_get_country_code() {
        let n = TargetNormalizer::default();
        assert_eq!(n.normalize_user("9876543210"), user("919876543210"));
        assert_eq!(n.normalize_user(" 98765-43210 "), user("919876543210"));
    }

    #[test]
    fn eleven_digits_with_trunk_zero() {
        let n = TargetNormalizer::default();
        assert_eq!(n.normalize_user("09876543210"), user("919876543210"));
        // Eleven digits without the leading zero are left alone.
        assert_eq!(n.normalize_user("19876543210"), user("19876543210"));
    }

    #[test]
    fn qualified_input_passes_through() {
        let n = TargetNormalizer::default();
        assert_eq!(
            n.normalize_user("  12345@s.whatsapp.net "),
            user("12345@s.whatsapp.net")
        );
        let r = Recipient::User("12345@lid".into());
        assert_eq!(n.to_address(&r), "12345@lid");
    }

    #[test]
    fn other_lengths_keep_digits_only() {
        let n = TargetNormalizer::default();
        assert_eq!(n.normalize_user("+44 20 7946 0958"), user("442079460958"));
        assert_eq!(n.normalize_user("abc"), None);
        assert_eq!(n.normalize_user("   "), None);
    }

    #[test]
    fn custom_country_code() {
        let n = TargetNormalizer::new("1", "@s.whatsapp.net", "@g.us");
        assert_eq!(n.normalize_user("5551234567"), user("15551234567"));
    }

    #[test]
    fn groups_trim_only() {
        let n = TargetNormalizer::default();
        assert_eq!(
            n.normalize_group(" 1203630-family "),
            Some(Recipient::Group("1203630-family".into()))
        );
        assert_eq!(n.normalize_group(""), None);
    }

    #[test]
    fn addresses_get_suffix_by_kind() {
        let n = TargetNormalizer::default();
        assert_eq!(
            n.to_address(&Recipient::User("919876543210".into())),
            "919876543210@s.whatsapp.net"
        );
        assert_eq!(n.to_address(&Recipient::Group("1203630".into())), "1203630@g.us");
    }

    #[test]
    fn batch_split_drops_empty_items() {
        let n = TargetNormalizer::default();
        let users = n.normalize_users("9876543210, ,09876543211,,x");
        assert_eq!(
            users,
            vec![
                Recipient::User("919876543210".into()),
                Recipient::User("919876543211".into()),
            ]
        );
        assert_eq!(n.normalize_groups(" a , b ,").len(), 2);
        assert_eq!(split_list(" hi , there ,, "), vec!["hi", "there"]);
    }

    #[test]
    fn target_mode_accepts_menu_numbers() {
        assert_eq!(TargetMode::parse("1"), Some(TargetMode::Users));
        assert_eq!(TargetMode::parse("Groups"), Some(TargetMode::Groups));
        assert_eq!(TargetMode::parse("3"), None);
    }
}
