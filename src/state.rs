use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sea_orm::DatabaseConnection;

use crate::chain::OwnershipCheck;
use crate::config::Config;
use crate::invites::{CodeStats, DbInviteStore, FileInviteStore, InviteAllocator, Tenant};
use crate::mailer::Mailer;

/// Request budget of one client.
struct Window {
    opened: Instant,
    hits: u32,
}

/// Fixed-window limiter keyed by client address. Per instance only.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    limit: u32,
    period: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, period: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            period,
        }
    }

    /// Count one request for `client`. When the budget is spent, returns
    /// how long until its window reopens.
    pub fn try_acquire(&self, client: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut window = self.windows.entry(client.to_owned()).or_insert(Window {
            opened: now,
            hits: 0,
        });
        let elapsed = now.duration_since(window.opened);
        if elapsed >= self.period {
            *window = Window { opened: now, hits: 0 };
        } else if window.hits >= self.limit {
            return Err(self.period - elapsed);
        }
        window.hits += 1;
        Ok(())
    }

    /// Forget clients whose window closed.
    pub fn prune(&self) {
        self.windows
            .retain(|_, window| window.opened.elapsed() < self.period);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.windows.len()
    }
}

/// Best-effort response cache with a fixed time-to-live. Per instance only.
pub struct TtlCache<K, V> {
    entries: DashMap<K, (V, Instant)>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let hit = self
            .entries
            .get(key)
            .and_then(|entry| (entry.1.elapsed() < self.ttl).then(|| entry.0.clone()));
        if hit.is_none() {
            self.entries.remove_if(key, |_, (_, at)| at.elapsed() >= self.ttl);
        }
        hit
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn cleanup(&self) {
        self.entries.retain(|_, (_, at)| at.elapsed() < self.ttl);
    }
}

/// Credentials checked by the auth helpers in `routes`.
#[derive(Clone, Default)]
pub struct Secrets {
    pub admin_password: Option<String>,
    pub superadmin_password: Option<String>,
    pub bot_api_key: Option<String>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub poker: Arc<InviteAllocator<DbInviteStore>>,
    pub superpoker: Arc<InviteAllocator<DbInviteStore>>,
    /// Poker pool kept on disk instead of in the database
    pub poker_file: Arc<InviteAllocator<FileInviteStore>>,
    pub ownership: OwnershipCheck,
    pub mailer: Mailer,
    pub secrets: Arc<Secrets>,
    /// Origin used for redirects and links in mails
    pub public_base_url: String,
    /// Rate limiter for the public invite endpoints
    pub invite_rate_limiter: Arc<RateLimiter>,
    /// Take the client address from `x-forwarded-for` instead of the socket
    pub trust_proxy: bool,
    pub stats_cache: Arc<TtlCache<Tenant, CodeStats>>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: &Config) -> Self {
        let poker = DbInviteStore::new(db.clone(), Tenant::Poker);
        let superpoker = DbInviteStore::new(db.clone(), Tenant::Superpoker);
        let poker_file =
            FileInviteStore::new(&config.invite_pool_file, &config.invite_assignments_file);

        Self {
            db,
            poker: Arc::new(InviteAllocator::new(poker, "poker")),
            superpoker: Arc::new(InviteAllocator::new(superpoker, "superpoker")),
            poker_file: Arc::new(InviteAllocator::new(poker_file, "poker-file")),
            ownership: OwnershipCheck::from_config(config),
            mailer: Mailer::from_config(config),
            secrets: Arc::new(Secrets {
                admin_password: config.admin_password.clone(),
                superadmin_password: config.superadmin_password.clone(),
                bot_api_key: config.bot_api_key.clone(),
            }),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            invite_rate_limiter: Arc::new(RateLimiter::new(
                config.rate_limit_max,
                Duration::from_secs(config.rate_limit_window_secs),
            )),
            trust_proxy: config.trust_proxy,
            stats_cache: Arc::new(TtlCache::new(Duration::from_secs(30))),
        }
    }

    /// DB-backed pool of `tenant`, for admin operations
    pub fn invite_store(&self, tenant: Tenant) -> &DbInviteStore {
        match tenant {
            Tenant::Poker => self.poker.store(),
            Tenant::Superpoker => self.superpoker.store(),
        }
    }

    /// Periodic housekeeping for the in-memory maps
    pub fn cleanup_memory(&self) {
        self.invite_rate_limiter.prune();
        self.stats_cache.cleanup();
    }
}
