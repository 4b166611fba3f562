use serde::{Deserialize, Serialize};

/// Table namespace for one invite program.
///
/// Both tenants share the same table shapes; they differ in table prefix and
/// in what identifies a requester (NFT token id vs Discord user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tenant {
    Poker,
    Superpoker,
}

impl Tenant {
    pub const ALL: [Tenant; 2] = [Tenant::Poker, Tenant::Superpoker];

    pub fn name(self) -> &'static str {
        match self {
            Tenant::Poker => "poker",
            Tenant::Superpoker => "superpoker",
        }
    }

    pub fn codes_table(self) -> &'static str {
        match self {
            Tenant::Poker => "invite_codes",
            Tenant::Superpoker => "superpoker_invite_codes",
        }
    }

    pub fn assignments_table(self) -> &'static str {
        match self {
            Tenant::Poker => "code_assignments",
            Tenant::Superpoker => "superpoker_code_assignments",
        }
    }

    pub fn usage_table(self) -> &'static str {
        match self {
            Tenant::Poker => "code_usage",
            Tenant::Superpoker => "superpoker_code_usage",
        }
    }

    /// Column holding the requester key in the assignments table.
    pub fn key_column(self) -> &'static str {
        match self {
            Tenant::Poker => "token_id",
            Tenant::Superpoker => "discord_id",
        }
    }

    /// Column holding the free-form requester label next to the key.
    pub fn meta_column(self) -> &'static str {
        match self {
            Tenant::Poker => "wallet_address",
            Tenant::Superpoker => "discord_username",
        }
    }
}

impl std::fmt::Display for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superpoker_tables_are_prefixed() {
        assert_eq!(Tenant::Superpoker.codes_table(), "superpoker_invite_codes");
        assert_eq!(Tenant::Superpoker.assignments_table(), "superpoker_code_assignments");
        assert_eq!(Tenant::Superpoker.usage_table(), "superpoker_code_usage");
        assert_eq!(Tenant::Poker.codes_table(), "invite_codes");
    }

    #[test]
    fn deserializes_from_path_segment() {
        let t: Tenant = serde_json::from_str("\"superpoker\"").unwrap();
        assert_eq!(t, Tenant::Superpoker);
        assert!(serde_json::from_str::<Tenant>("\"blackjack\"").is_err());
    }
}
