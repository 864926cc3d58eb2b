//! Game-configuration collaborator.
//!
//! Difficulty and spawn-rate edits are replicated through the session
//! protocol, but where the applied values live is the application's
//! business. The coordinator only calls this trait.

use std::collections::HashMap;
use std::sync::Mutex;

use lobbymesh_protocol::{ItemSpawnRate, MonsterDifficulty, SessionId};

/// Stores replicated game-configuration values, keyed by session id.
pub trait GameConfigStore: Send + Sync + 'static {
    /// Applies a replicated difficulty value for the given session.
    fn set_monster_difficulty(
        &self,
        session_id: &SessionId,
        difficulty: MonsterDifficulty,
    );

    /// Applies a replicated spawn-rate value for the given session.
    fn set_item_spawn_rate(
        &self,
        session_id: &SessionId,
        spawn_rate: ItemSpawnRate,
    );
}

/// An in-memory [`GameConfigStore`] for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    inner: Mutex<HashMap<SessionId, SessionConfigValues>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct SessionConfigValues {
    difficulty: Option<MonsterDifficulty>,
    spawn_rate: Option<ItemSpawnRate>,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored difficulty for a session, if one was ever applied.
    pub fn monster_difficulty(
        &self,
        session_id: &SessionId,
    ) -> Option<MonsterDifficulty> {
        self.lock().get(session_id).and_then(|v| v.difficulty)
    }

    /// The stored spawn rate for a session, if one was ever applied.
    pub fn item_spawn_rate(
        &self,
        session_id: &SessionId,
    ) -> Option<ItemSpawnRate> {
        self.lock().get(session_id).and_then(|v| v.spawn_rate)
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<SessionId, SessionConfigValues>>
    {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl GameConfigStore for MemoryConfigStore {
    fn set_monster_difficulty(
        &self,
        session_id: &SessionId,
        difficulty: MonsterDifficulty,
    ) {
        self.lock()
            .entry(session_id.clone())
            .or_default()
            .difficulty = Some(difficulty);
    }

    fn set_item_spawn_rate(
        &self,
        session_id: &SessionId,
        spawn_rate: ItemSpawnRate,
    ) {
        self.lock()
            .entry(session_id.clone())
            .or_default()
            .spawn_rate = Some(spawn_rate);
    }
}
