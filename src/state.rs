//! Application state: exercise store, HTTP exercise sessions, prompts, OpenAI client.
//!
//! This module owns:
//!   - the exercise store (by id) and the fallback pool (config bank + seeds)
//!   - HTTP sessions, each holding one `ExerciseSession`, evicted when idle
//!   - the prompts struct (from TOML or defaults)
//!   - optional OpenAI client
//!
//! Selection policy: generate a fresh exercise via OpenAI when available,
//! otherwise serve one from the fallback pool, otherwise a hard fallback.
//!
//! Retention: HTTP sessions untouched for `SESSION_TTL_SECS` are swept, and
//! the map never holds more than `MAX_SESSIONS` (least recently touched goes
//! first). Generated and client exercises are dropped once they are older than
//! the TTL and no session points at them. Pool exercises are never dropped.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use rand::seq::SliceRandom;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_agent_config_from_env, AgentConfig, Prompts};
use crate::domain::{Exercise, ExerciseRequest, ExerciseSource, StoredExercise};
use crate::engine::ExerciseView;
use crate::openai::OpenAI;
use crate::seeds::{hard_fallback_exercise, seed_exercises};
use crate::session::{ExerciseSession, Intent};
use crate::validate::normalize;

/// Bounds on the HTTP session map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    pub ttl: Duration,
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(30 * 60), max_sessions: 10_000 }
    }
}

impl SessionLimits {
    /// `SESSION_TTL_SECS` and `MAX_SESSIONS`, each falling back to its default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ttl = std::env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.ttl);
        let max_sessions = std::env::var("MAX_SESSIONS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_sessions);
        Self { ttl, max_sessions }
    }
}

/// One HTTP session plus what retention needs to know about it.
pub struct SessionEntry {
    session: ExerciseSession,
    exercise_id: String,
    touched: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub by_id: Arc<RwLock<HashMap<String, StoredExercise>>>,
    /// Ids of local bank and seed exercises, fixed at startup.
    pub pool: Arc<Vec<String>>,
    pub last_served: Arc<RwLock<Option<String>>>,
    pub sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    pub limits: SessionLimits,
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
}

impl AppState {
    /// Build state from env: load config, seed exercises, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "gapfill_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
        } else {
            info!(target: "gapfill_backend", "OpenAI disabled (no OPENAI_API_KEY). Using local/seed exercises.");
        }
        let limits = SessionLimits::from_env();
        info!(target: "gapfill_backend", ttl_secs = limits.ttl.as_secs(), max_sessions = limits.max_sessions, "Session limits");
        Self::from_parts(load_agent_config_from_env(), openai).with_session_limits(limits)
    }

    pub fn with_session_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Build state from an optional config and client.
    pub fn from_parts(cfg: Option<AgentConfig>, openai: Option<OpenAI>) -> Self {
        let prompts = cfg.as_ref().map(|c| c.prompts.clone()).unwrap_or_default();

        let mut id_map = HashMap::<String, StoredExercise>::new();
        let mut pool = Vec::new();
        let mut push = |exercise: Exercise, source: ExerciseSource| {
            let id = Uuid::new_v4().to_string();
            pool.push(id.clone());
            id_map.insert(id.clone(), StoredExercise { id, source, exercise, stored_at: Instant::now() });
        };

        // Config-bank exercises go through the same validator as any payload.
        let mut bank = 0usize;
        if let Some(cfg) = &cfg {
            for (index, raw) in cfg.exercises.iter().enumerate() {
                let parsed = serde_json::to_value(raw)
                    .map_err(|e| e.to_string())
                    .and_then(|v| normalize(&v).map_err(|e| e.reason()));
                match parsed {
                    Ok(exercise) => {
                        push(exercise, ExerciseSource::LocalBank);
                        bank += 1;
                    }
                    Err(reason) => {
                        error!(target: "exercise", index, %reason, "Skipping bank exercise: invalid payload.");
                    }
                }
            }
        }

        for exercise in seed_exercises() {
            push(exercise, ExerciseSource::Seed);
        }

        info!(target: "exercise", local_bank = bank, pool = pool.len(), "Startup exercise inventory");

        Self {
            by_id: Arc::new(RwLock::new(id_map)),
            pool: Arc::new(pool),
            last_served: Arc::new(RwLock::new(None)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            limits: SessionLimits::default(),
            openai,
            prompts,
        }
    }

    /// Store an exercise under a fresh id.
    #[instrument(level = "debug", skip(self, exercise), fields(title = %exercise.title))]
    pub async fn insert_exercise(&self, exercise: Exercise, source: ExerciseSource) -> StoredExercise {
        let stored = StoredExercise {
            id: Uuid::new_v4().to_string(),
            source,
            exercise,
            stored_at: Instant::now(),
        };
        self.by_id.write().await.insert(stored.id.clone(), stored.clone());
        stored
    }

    /// Read-only access to an exercise by id.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_exercise(&self, id: &str) -> Option<StoredExercise> {
        self.by_id.read().await.get(id).cloned()
    }

    /// Selection policy:
    /// Generate a fresh exercise via OpenAI when available.
    /// Otherwise serve from the pool (avoiding the last one served), then a hard fallback.
    #[instrument(level = "info", skip(self, request), fields(topic = %request.topic))]
    pub async fn choose_exercise(&self, request: &ExerciseRequest) -> (StoredExercise, &'static str) {
        if let Some(oa) = &self.openai {
            match oa.generate_exercise(&self.prompts, request).await {
                Ok(exercise) => {
                    let stored = self.insert_exercise(exercise, ExerciseSource::Generated).await;
                    *self.last_served.write().await = Some(stored.id.clone());
                    info!(target: "exercise", topic = %request.topic, chosen = %stored.id, source = "openai_generated_new", "Generated fresh exercise");
                    return (stored, "openai_generated_new");
                }
                Err(e) => {
                    error!(target: "exercise", topic = %request.topic, error = %e, "OpenAI generation failed; using local pool");
                }
            }
        } else {
            warn!(target: "exercise", topic = %request.topic, "OPENAI_API_KEY not set; serving from local pool");
        }

        let last = self.last_served.read().await.clone();
        let chosen_id = {
            let candidates: Vec<&String> = self
                .pool
                .iter()
                .filter(|id| Some(*id) != last.as_ref())
                .collect();
            let mut rng = rand::thread_rng();
            candidates
                .choose(&mut rng)
                .map(|id| (*id).clone())
                .or_else(|| self.pool.first().cloned())
        };

        if let Some(id) = chosen_id {
            if let Some(stored) = self.get_exercise(&id).await {
                *self.last_served.write().await = Some(id.clone());
                warn!(target: "exercise", chosen = %id, source = "existing_pool", "Serving existing exercise");
                return (stored, "existing_pool");
            }
        }

        let stored = self.insert_exercise(hard_fallback_exercise(), ExerciseSource::Seed).await;
        *self.last_served.write().await = Some(stored.id.clone());
        warn!(target: "exercise", chosen = %stored.id, source = "hard_fallback", "Inserted hard fallback exercise");
        (stored, "hard_fallback")
    }

    /// Register a session over `exercise_id` and return its id.
    /// At the cap, the least recently touched session makes room.
    #[instrument(level = "debug", skip(self, session), fields(%exercise_id))]
    pub async fn open_session(&self, exercise_id: &str, session: ExerciseSession) -> String {
        let id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        while sessions.len() >= self.limits.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(sid, _)| sid.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            warn!(target: "exercise", session_id = %oldest, max_sessions = self.limits.max_sessions, "Session cap reached; evicted least recently touched session");
        }
        sessions.insert(
            id.clone(),
            SessionEntry { session, exercise_id: exercise_id.to_string(), touched: Instant::now() },
        );
        id
    }

    pub async fn session_view(&self, id: &str) -> Option<ExerciseView> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.touched = Instant::now();
        entry.session.view()
    }

    /// Apply one intent under the write lock. `None` if the session is unknown.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn apply_intent(&self, id: &str, intent: Intent) -> Option<ExerciseView> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.touched = Instant::now();
        entry.session.apply(intent)
    }

    /// Drop sessions idle for `ttl` or longer, then non-pool exercises that
    /// are at least as old and referenced by no remaining session.
    /// Returns (sessions evicted, exercises dropped).
    #[instrument(level = "debug", skip(self))]
    pub async fn evict_idle(&self, ttl: Duration) -> (usize, usize) {
        let (evicted, referenced) = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, entry| entry.touched.elapsed() < ttl);
            let referenced: HashSet<String> =
                sessions.values().map(|entry| entry.exercise_id.clone()).collect();
            (before - sessions.len(), referenced)
        };

        let dropped = {
            let mut by_id = self.by_id.write().await;
            let before = by_id.len();
            by_id.retain(|id, stored| {
                self.pool.contains(id) || referenced.contains(id) || stored.stored_at.elapsed() < ttl
            });
            before - by_id.len()
        };

        if evicted > 0 || dropped > 0 {
            info!(target: "exercise", evicted, dropped, "Idle sessions swept");
        }
        (evicted, dropped)
    }

    pub async fn close_session(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }
}

/// Sweep idle sessions every quarter TTL for the life of the process.
pub fn spawn_session_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    let period = (state.limits.ttl / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(period);
        loop {
            interval_timer.tick().await;
            state.evict_idle(state.limits.ttl).await;
        }
    })
}
