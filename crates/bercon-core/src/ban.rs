//! GUID and IP bans reported by the `bans` command

/// How long a ban remains in force
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanDuration {
    /// Remaining minutes
    Minutes(u32),
    /// Never expires
    Permanent,
    /// Already expired, pending removal by the server
    Expired,
}

/// One row of the server's ban list
///
/// The index is assigned by the server and shifts as other bans are
/// removed, so it cannot be stored long-term for unbanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ban {
    pub index: u32,
    /// BattlEye GUID or IP address the ban applies to
    pub id: String,
    pub duration: BanDuration,
    pub reason: String,
}
