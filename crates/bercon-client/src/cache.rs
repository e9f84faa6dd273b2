//! In-memory player registry with two-phase admission.
//!
//! A connect message only creates a *pending* entry; the player becomes
//! visible to user code once the server verifies their GUID, or after a
//! short grace period when no verification arrives (some servers have the
//! anti-cheat layer disabled). `players` responses bypass admission since
//! the server itself vouches for every row.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bercon_core::parser::ParsedPlayer;
use tokio::sync::Mutex;
use tracing::debug;

use crate::player::Player;

/// How long a pending player waits for GUID verification before being
/// published anyway.
pub const ADMISSION_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct CacheState {
    /// Players visible to user code
    published: HashMap<u16, Player>,
    /// Players awaiting GUID verification or the grace timer
    pending: HashMap<u16, Player>,
    /// The ID the server assigned to this RCON client
    admin_id: Option<u16>,
}

impl CacheState {
    fn get_either(&mut self, id: u16) -> Option<&mut Player> {
        // Pending first; a player cannot be in both maps
        self.pending.get_mut(&id).or_else(|| self.published.get_mut(&id))
    }

    fn publish(&mut self, id: u16) {
        // A players refresh may have published this id already, in which
        // case the stale pending entry is thrown away
        let Some(player) = self.pending.remove(&id) else {
            return;
        };
        self.published.entry(id).or_insert(player);
    }
}

/// Shared player registry; clones refer to the same cache.
#[derive(Clone)]
pub struct PlayerCache {
    state: Arc<Mutex<CacheState>>,
    grace: Duration,
}

impl PlayerCache {
    pub fn new() -> Self {
        Self::with_grace(ADMISSION_GRACE)
    }

    /// Creates a cache with a custom admission grace period.
    pub fn with_grace(grace: Duration) -> Self {
        PlayerCache {
            state: Arc::new(Mutex::new(CacheState::default())),
            grace,
        }
    }

    /// Empties the cache; done on every (re)login.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.published.clear();
        state.pending.clear();
        state.admin_id = None;
    }

    /// The server-assigned ID of this client, once known.
    pub async fn admin_id(&self) -> Option<u16> {
        self.state.lock().await.admin_id
    }

    pub async fn set_admin_id(&self, id: u16) {
        self.state.lock().await.admin_id = Some(id);
    }

    /// Snapshot of all published players.
    pub async fn players(&self) -> Vec<Player> {
        self.state.lock().await.published.values().cloned().collect()
    }

    pub async fn get(&self, id: u16) -> Option<Player> {
        self.state.lock().await.published.get(&id).cloned()
    }

    /// Looks up a published player by exact name.
    pub async fn find_by_name(&self, name: &str) -> Option<Player> {
        let state = self.state.lock().await;
        state.published.values().find(|p| p.name == name).cloned()
    }

    /// Admits a freshly connected player into the pending set and starts
    /// their grace timer.
    pub async fn add_connected(&self, id: u16, name: &str, addr: &str) -> Player {
        let player = Player {
            id,
            name: name.to_string(),
            guid: String::new(),
            addr: addr.to_string(),
            ping: None,
            is_guid_valid: false,
            in_lobby: false,
        };
        self.state.lock().await.pending.insert(id, player.clone());

        let cache = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(cache.grace).await;
            cache.state.lock().await.publish(id);
        });

        player
    }

    /// Records the player's GUID without publishing them.
    ///
    /// Returns `None` when the id is unknown, which happens when the GUID
    /// message arrives before the connect message; such GUIDs are dropped.
    pub async fn set_guid(&self, id: u16, guid: &str) -> Option<Player> {
        let mut state = self.state.lock().await;
        let player = state.get_either(id)?;
        player.guid = guid.to_string();
        Some(player.clone())
    }

    /// Marks the GUID verified and publishes the player immediately.
    pub async fn verify_guid(&self, id: u16) -> Option<Player> {
        let mut state = self.state.lock().await;
        let player = state.get_either(id)?;
        player.is_guid_valid = true;
        let player = player.clone();
        state.publish(id);
        Some(player)
    }

    /// Removes a player on disconnect or kick, whichever set holds them.
    pub async fn remove(&self, id: u16) -> Option<Player> {
        let mut state = self.state.lock().await;
        let removed = state.published.remove(&id);
        removed.or_else(|| state.pending.remove(&id))
    }

    /// Reconciles the published set against a full `players` response.
    ///
    /// Rows update players in place or create new published entries;
    /// published players absent from the response are dropped.
    pub async fn update_from_players(&self, rows: &[ParsedPlayer]) {
        let mut state = self.state.lock().await;

        for row in rows {
            let player = state.published.entry(row.id).or_insert_with(|| Player {
                id: row.id,
                name: String::new(),
                guid: String::new(),
                addr: String::new(),
                ping: None,
                is_guid_valid: false,
                in_lobby: false,
            });
            player.name = row.name.clone();
            player.guid = row.guid.clone();
            player.addr = row.addr.clone();
            player.ping = Some(row.ping);
            player.is_guid_valid = row.is_guid_valid;
            player.in_lobby = row.in_lobby;
        }

        let current: Vec<u16> = state.published.keys().copied().collect();
        for id in current {
            if !rows.iter().any(|row| row.id == id) {
                debug!(id, "dropping player absent from players response");
                state.published.remove(&id);
            }
        }
    }
}

impl Default for PlayerCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::yield_now;
    use tokio::time::advance;

    fn row(id: u16, name: &str) -> ParsedPlayer {
        ParsedPlayer {
            id,
            name: name.into(),
            guid: "394e2c09af98b00fd4094f86c7921622".into(),
            addr: "1.2.3.4:2304".into(),
            ping: 47,
            is_guid_valid: true,
            in_lobby: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_publishes_after_grace() {
        let cache = PlayerCache::new();
        cache.add_connected(3, "Spam", "1.2.3.4:2304").await;
        assert!(cache.get(3).await.is_none());

        advance(ADMISSION_GRACE - Duration::from_secs(1)).await;
        yield_now().await;
        assert!(cache.get(3).await.is_none());

        advance(Duration::from_secs(2)).await;
        yield_now().await;
        let player = cache.get(3).await.unwrap();
        assert_eq!(player.name, "Spam");
        assert!(!player.is_guid_valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guid_verification_publishes_early() {
        let cache = PlayerCache::new();
        cache.add_connected(3, "Spam", "1.2.3.4:2304").await;

        cache
            .set_guid(3, "394e2c09af98b00fd4094f86c7921622")
            .await
            .unwrap();
        assert!(cache.get(3).await.is_none());

        let player = cache.verify_guid(3).await.unwrap();
        assert!(player.is_guid_valid);
        assert_eq!(cache.get(3).await.unwrap().guid, player.guid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guid_for_unknown_player_is_dropped() {
        let cache = PlayerCache::new();
        assert!(cache.set_guid(9, "abcdef").await.is_none());
        assert!(cache.verify_guid(9).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_player_is_not_published_later() {
        let cache = PlayerCache::new();
        cache.add_connected(3, "Spam", "1.2.3.4:2304").await;
        assert!(cache.remove(3).await.is_some());

        advance(ADMISSION_GRACE + Duration::from_secs(1)).await;
        yield_now().await;
        assert!(cache.get(3).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_players_refresh_wins_over_grace_timer() {
        let cache = PlayerCache::new();
        cache.add_connected(3, "Spam", "1.2.3.4:2304").await;
        cache.update_from_players(&[row(3, "Spam")]).await;

        advance(ADMISSION_GRACE + Duration::from_secs(1)).await;
        yield_now().await;

        // The refreshed entry survives; the stale pending one is discarded
        let player = cache.get(3).await.unwrap();
        assert_eq!(player.ping, Some(47));
        assert!(player.is_guid_valid);
    }

    #[tokio::test]
    async fn test_reconciliation_drops_absent_players() {
        let cache = PlayerCache::new();
        cache.update_from_players(&[row(1, "Spam"), row(2, "H8m")]).await;
        assert_eq!(cache.players().await.len(), 2);

        cache.update_from_players(&[row(2, "H8m")]).await;
        assert!(cache.get(1).await.is_none());
        assert!(cache.get(2).await.is_some());
    }

    #[tokio::test]
    async fn test_find_by_name_ignores_pending() {
        let cache = PlayerCache::new();
        cache.add_connected(3, "Spam", "1.2.3.4:2304").await;
        assert!(cache.find_by_name("Spam").await.is_none());

        cache.verify_guid(3).await.unwrap();
        assert!(cache.find_by_name("Spam").await.is_some());
    }
}
