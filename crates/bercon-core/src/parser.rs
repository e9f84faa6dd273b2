//! Parsing of server text messages and tabular command responses.
//!
//! BattlEye reports all activity as free-form text lines. The patterns here
//! are the fixed formats game servers emit; [`ParsedMessage::try_parse`]
//! tries them in priority order and the first full match wins.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ban::{Ban, BanDuration};

static ADMIN_LOGIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^RCon admin #(?P<id>\d+) \((?P<addr>.*?:\d+)\) logged in$").unwrap()
});
static PLAYER_CONNECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Player #(?P<id>\d+) (?P<name>.+) \((?P<addr>.*?:\d+)\) connected$").unwrap()
});
static PLAYER_GUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Player #(?P<id>\d+) (?P<name>.+) - BE GUID: (?P<guid>\w+)$").unwrap()
});
static PLAYER_VERIFY_GUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Verified GUID \((?P<guid>\w+)\) of player #(?P<id>\d+) (?P<name>.+)$").unwrap()
});
static PLAYER_DISCONNECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Player #(?P<id>\d+) (?P<name>.+) disconnected$").unwrap());
static PLAYER_KICK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^Player #(?P<id>\d+) (?P<name>.+) \((?P<guid>\w+|-)\) ",
        r"has been kicked by BattlEye: (?P<reason>.+)$",
    ))
    .unwrap()
});
static ADMIN_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^RCon admin #(?P<id>\d+): \((?P<channel>.+?)\) (?P<message>.+)$").unwrap()
});
static PLAYER_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    // Names containing ": " are inherently ambiguous in this format; the
    // shortest channel and name win, as the game's own tools assume
    Regex::new(r"^\((?P<channel>.+?)\) (?P<name>.+?): (?P<message>.+)$").unwrap()
});

// Command response rows
static ADMINS_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<id>\d+) +(?P<addr>.*?:\d+)").unwrap());
static BANS_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<index>\d+) +(?P<ban_id>[\w.]+) +(?P<duration>\d+|-|perm) +(?P<reason>.*)")
        .unwrap()
});
static PLAYERS_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?P<id>\d+) +(?P<addr>.*?:\d+) +(?P<ping>\d+) +",
        r"(?P<guid>\w+)\((?P<guid_status>[\w?]+)\) +(?P<name>.+)",
    ))
    .unwrap()
});

/// A server message matched against one of the known patterns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    /// An RCON admin (possibly this client) logged in
    AdminLogin { id: u16, addr: String },
    /// First message of a player joining; the GUID follows separately
    PlayerConnect { id: u16, name: String, addr: String },
    /// The player's GUID as reported by the anti-cheat layer
    PlayerGuid { id: u16, name: String, guid: String },
    /// The server confirmed the GUID is genuine
    PlayerVerifyGuid { id: u16, name: String, guid: String },
    PlayerDisconnect { id: u16, name: String },
    /// The guid is absent when the player was kicked before it was known
    PlayerKick {
        id: u16,
        name: String,
        guid: Option<String>,
        reason: String,
    },
    /// Chat sent by an admin; whispers use a channel of `To <name>`
    AdminMessage {
        id: u16,
        channel: String,
        message: String,
    },
    /// Chat sent by a player
    PlayerMessage {
        channel: String,
        name: String,
        message: String,
    },
}

impl ParsedMessage {
    /// Matches a server message against the known patterns,
    /// most specific first.
    pub fn try_parse(message: &str) -> Option<ParsedMessage> {
        if let Some(c) = ADMIN_LOGIN.captures(message) {
            return Some(ParsedMessage::AdminLogin {
                id: c["id"].parse().ok()?,
                addr: c["addr"].to_string(),
            });
        }
        if let Some(c) = PLAYER_CONNECT.captures(message) {
            return Some(ParsedMessage::PlayerConnect {
                id: c["id"].parse().ok()?,
                name: c["name"].to_string(),
                addr: c["addr"].to_string(),
            });
        }
        if let Some(c) = PLAYER_GUID.captures(message) {
            return Some(ParsedMessage::PlayerGuid {
                id: c["id"].parse().ok()?,
                name: c["name"].to_string(),
                guid: c["guid"].to_string(),
            });
        }
        if let Some(c) = PLAYER_VERIFY_GUID.captures(message) {
            return Some(ParsedMessage::PlayerVerifyGuid {
                id: c["id"].parse().ok()?,
                name: c["name"].to_string(),
                guid: c["guid"].to_string(),
            });
        }
        if let Some(c) = PLAYER_DISCONNECT.captures(message) {
            return Some(ParsedMessage::PlayerDisconnect {
                id: c["id"].parse().ok()?,
                name: c["name"].to_string(),
            });
        }
        if let Some(c) = PLAYER_KICK.captures(message) {
            let guid = match &c["guid"] {
                "-" => None,
                guid => Some(guid.to_string()),
            };
            return Some(ParsedMessage::PlayerKick {
                id: c["id"].parse().ok()?,
                name: c["name"].to_string(),
                guid,
                reason: c["reason"].to_string(),
            });
        }
        if let Some(c) = ADMIN_MESSAGE.captures(message) {
            return Some(ParsedMessage::AdminMessage {
                id: c["id"].parse().ok()?,
                channel: c["channel"].to_string(),
                message: c["message"].to_string(),
            });
        }
        if let Some(c) = PLAYER_MESSAGE.captures(message) {
            return Some(ParsedMessage::PlayerMessage {
                channel: c["channel"].to_string(),
                name: c["name"].to_string(),
                message: c["message"].to_string(),
            });
        }
        None
    }
}

/// Returns true for routine diagnostics the server emits that carry no
/// event of their own and should be consumed silently.
pub fn is_expected_message(message: &str) -> bool {
    const PREFIXES: [&str; 2] = ["Config entry:", "Failed to receive from BE Master"];
    const EXACT: [&str; 5] = [
        "Ban check timed out, no response from BE Master",
        "Connected to BE Master",
        "Disconnected from BE Master",
        "Failed to resolve BE Master DNS name(s)",
        "Master query timed out, no response from BE Master",
    ];
    PREFIXES.iter().any(|p| message.starts_with(p)) || EXACT.contains(&message)
}

/// One row of an `admins` command response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAdmin {
    pub id: u16,
    pub addr: String,
}

/// One row of a `players` command response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPlayer {
    pub id: u16,
    pub name: String,
    pub guid: String,
    pub addr: String,
    pub ping: u16,
    pub is_guid_valid: bool,
    pub in_lobby: bool,
}

/// Parses an `admins` command response into id/address pairs.
pub fn parse_admins(response: &str) -> Vec<ParsedAdmin> {
    ADMINS_ROW
        .captures_iter(response)
        .filter_map(|c| {
            Some(ParsedAdmin {
                id: c["id"].parse().ok()?,
                addr: c["addr"].to_string(),
            })
        })
        .collect()
}

/// Parses a `bans` command response into [`Ban`] rows.
pub fn parse_bans(response: &str) -> Vec<Ban> {
    BANS_ROW
        .captures_iter(response)
        .filter_map(|c| {
            let duration = match &c["duration"] {
                "-" => BanDuration::Expired,
                "perm" => BanDuration::Permanent,
                minutes => BanDuration::Minutes(minutes.parse().ok()?),
            };
            Some(Ban {
                index: c["index"].parse().ok()?,
                id: c["ban_id"].to_string(),
                duration,
                reason: c["reason"].to_string(),
            })
        })
        .collect()
}

/// Parses a `players` command response into [`ParsedPlayer`] rows.
///
/// Lobby players are reported with a ` (Lobby)` name suffix, which is
/// stripped into the `in_lobby` flag.
pub fn parse_players(response: &str) -> Vec<ParsedPlayer> {
    PLAYERS_ROW
        .captures_iter(response)
        .filter_map(|c| {
            let name = c["name"].to_string();
            let (name, in_lobby) = match name.strip_suffix(" (Lobby)") {
                Some(stripped) => (stripped.to_string(), true),
                None => (name, false),
            };
            Some(ParsedPlayer {
                id: c["id"].parse().ok()?,
                name,
                guid: c["guid"].to_string(),
                addr: c["addr"].to_string(),
                ping: c["ping"].parse().ok()?,
                is_guid_valid: &c["guid_status"] == "OK",
                in_lobby,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_login() {
        assert_eq!(
            ParsedMessage::try_parse("RCon admin #4 (1.2.3.4:1234) logged in"),
            Some(ParsedMessage::AdminLogin {
                id: 4,
                addr: "1.2.3.4:1234".into()
            })
        );
    }

    #[test]
    fn test_player_lifecycle_messages() {
        assert_eq!(
            ParsedMessage::try_parse("Player #3 Spam (9.8.7.6:2304) connected"),
            Some(ParsedMessage::PlayerConnect {
                id: 3,
                name: "Spam".into(),
                addr: "9.8.7.6:2304".into()
            })
        );
        assert_eq!(
            ParsedMessage::try_parse(
                "Player #3 Spam - BE GUID: 394e2c09af98b00fd4094f86c7921622"
            ),
            Some(ParsedMessage::PlayerGuid {
                id: 3,
                name: "Spam".into(),
                guid: "394e2c09af98b00fd4094f86c7921622".into()
            })
        );
        assert_eq!(
            ParsedMessage::try_parse(
                "Verified GUID (394e2c09af98b00fd4094f86c7921622) of player #3 Spam"
            ),
            Some(ParsedMessage::PlayerVerifyGuid {
                id: 3,
                name: "Spam".into(),
                guid: "394e2c09af98b00fd4094f86c7921622".into()
            })
        );
        assert_eq!(
            ParsedMessage::try_parse("Player #3 Spam disconnected"),
            Some(ParsedMessage::PlayerDisconnect {
                id: 3,
                name: "Spam".into()
            })
        );
    }

    #[test]
    fn test_player_kick_with_and_without_guid() {
        assert_eq!(
            ParsedMessage::try_parse(
                "Player #3 Spam (394e2c09af98b00fd4094f86c7921622) has been kicked \
                 by BattlEye: Admin Kick (bye)"
            ),
            Some(ParsedMessage::PlayerKick {
                id: 3,
                name: "Spam".into(),
                guid: Some("394e2c09af98b00fd4094f86c7921622".into()),
                reason: "Admin Kick (bye)".into()
            })
        );
        assert_eq!(
            ParsedMessage::try_parse(
                "Player #3 Spam (-) has been kicked by BattlEye: Client not responding"
            ),
            Some(ParsedMessage::PlayerKick {
                id: 3,
                name: "Spam".into(),
                guid: None,
                reason: "Client not responding".into()
            })
        );
    }

    #[test]
    fn test_admin_and_player_chat() {
        assert_eq!(
            ParsedMessage::try_parse("RCon admin #4: (Global) server restart in 5"),
            Some(ParsedMessage::AdminMessage {
                id: 4,
                channel: "Global".into(),
                message: "server restart in 5".into()
            })
        );
        assert_eq!(
            ParsedMessage::try_parse("RCon admin #4: (To Spam) stop that"),
            Some(ParsedMessage::AdminMessage {
                id: 4,
                channel: "To Spam".into(),
                message: "stop that".into()
            })
        );
        assert_eq!(
            ParsedMessage::try_parse("(Side) Spam: anyone near the airfield?"),
            Some(ParsedMessage::PlayerMessage {
                channel: "Side".into(),
                name: "Spam".into(),
                message: "anyone near the airfield?".into()
            })
        );
    }

    #[test]
    fn test_expected_messages_and_unknown_text() {
        assert!(is_expected_message("Connected to BE Master"));
        assert!(is_expected_message("Config entry: MaxPing 300"));
        assert!(is_expected_message(
            "Failed to receive from BE Master (timeout)"
        ));
        assert!(!is_expected_message("something else entirely"));
        assert_eq!(ParsedMessage::try_parse("something else entirely"), None);
    }

    #[test]
    fn test_parse_admins_skips_decoration() {
        let response = "Connected RCon admins:\n\
                        [#] [IP Address]:[Port]\n\
                        -----------------------------\n\
                        0 1.2.3.4:1234\n\
                        1 2.3.4.5:2345";
        assert_eq!(
            parse_admins(response),
            vec![
                ParsedAdmin {
                    id: 0,
                    addr: "1.2.3.4:1234".into()
                },
                ParsedAdmin {
                    id: 1,
                    addr: "2.3.4.5:2345".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_bans_durations() {
        let response = "GUID Bans:\n\
                        [#] [GUID] [Minutes left] [Reason]\n\
                        ----------------------------------------\n\
                        0 394e2c09af98b00fd4094f86c7921622 perm Cheating\n\
                        1 d93ed2257011b47e67fa53e824b60ca5 - Expired ban\n\
                        2 192.168.1.1 120 Teamkilling";
        let bans = parse_bans(response);
        assert_eq!(bans.len(), 3);
        assert_eq!(bans[0].duration, BanDuration::Permanent);
        assert_eq!(bans[1].duration, BanDuration::Expired);
        assert_eq!(bans[2].duration, BanDuration::Minutes(120));
        assert_eq!(bans[2].id, "192.168.1.1");
        assert_eq!(bans[2].reason, "Teamkilling");
    }

    #[test]
    fn test_parse_players_rows() {
        let response = "Players on server:\n\
                        [#] [IP Address]:[Port] [Ping] [GUID] [Name]\n\
                        --------------------------------------------------\n\
                        0 1.2.3.4:2304 47 394e2c09af98b00fd4094f86c7921622(OK) Spam\n\
                        1 2.3.4.5:2304 125 d93ed2257011b47e67fa53e824b60ca5(?) H8m (Lobby)\n\
                        (2 players in total)";
        let players = parse_players(response);
        assert_eq!(players.len(), 2);

        assert_eq!(players[0].id, 0);
        assert_eq!(players[0].name, "Spam");
        assert_eq!(players[0].ping, 47);
        assert!(players[0].is_guid_valid);
        assert!(!players[0].in_lobby);

        assert_eq!(players[1].name, "H8m");
        assert!(!players[1].is_guid_valid);
        assert!(players[1].in_lobby);
    }
}
