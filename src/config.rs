use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub timing: TimingConfig,
}

/// Every timing knob of the hand engine, overridable from the environment.
/// Tests construct this directly with shortened values.
#[derive(Clone, Debug)]
pub struct TimingConfig {
    /// Per-turn decision deadline.
    pub turn_time_ms: i64,
    /// Consecutive forced timeouts before a player is queued for an away kick.
    pub away_timeouts_in_row: u32,
    /// Delay before the first board card of a street is revealed.
    pub street_pre_delay_ms: u64,
    /// Delay between consecutive board cards.
    pub board_card_interval_ms: u64,
    /// Delay after the last board card of a street.
    pub street_post_delay_ms: u64,
    /// Hold after an uncontested (fold) win before the next hand may start.
    pub win_by_fold_hold_ms: u64,
    /// Hold after a showdown before the next hand may start.
    pub showdown_hold_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            turn_time_ms: 15_000,
            away_timeouts_in_row: 2,
            street_pre_delay_ms: 250,
            board_card_interval_ms: 220,
            street_post_delay_ms: 350,
            win_by_fold_hold_ms: 1_500,
            showdown_hold_ms: 2_500,
        }
    }
}

/// Buy-in bounds relative to the big blind. A rebuy may not push the stack
/// past the maximum.
pub const MIN_BUYIN_BB: i64 = 20;
pub const MAX_BUYIN_BB: i64 = 100;

/// Minimum funded seats required to start a hand.
pub const MIN_PLAYERS_TO_START: usize = 2;

/// Heads-up tables use reversed blind/button rules.
pub const HEADS_UP_PLAYER_COUNT: usize = 2;

/// Broadcast channel capacity for table and user rooms.
pub const BROADCAST_CHANNEL_CAPACITY: usize = 100;

/// TTL on runtime blobs and hole cards in the KV store, refreshed on write.
pub const RUNTIME_TTL_SECS: u64 = 3600;

/// Expiry on the hand-start lock so a crashed starter cannot deadlock a table.
pub const HAND_START_LOCK_SECS: u64 = 5;

/// TTL on the cached public snapshot.
pub const PUBLIC_STATE_TTL_SECS: u64 = 10;

/// Upper bound on auto-runout street advances within one hand.
pub const AUTO_RUNOUT_MAX_STEPS: usize = 10;

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:cardroom.db".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development_secret_key_change_in_production".to_string()),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            timing: TimingConfig {
                turn_time_ms: env_i64("TURN_TIME_MS", 15_000),
                away_timeouts_in_row: env_i64("AWAY_TIMEOUTS_IN_ROW", 2) as u32,
                street_pre_delay_ms: env_i64("STREET_PRE_DELAY_MS", 250) as u64,
                board_card_interval_ms: env_i64("BOARD_CARD_INTERVAL_MS", 220) as u64,
                street_post_delay_ms: env_i64("STREET_POST_DELAY_MS", 350) as u64,
                win_by_fold_hold_ms: env_i64("WIN_BY_FOLD_HOLD_MS", 1_500) as u64,
                showdown_hold_ms: env_i64("SHOWDOWN_HOLD_MS", 2_500) as u64,
            },
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
