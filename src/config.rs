//! Session rules and timing, loaded from `memorymatch.toml`.

use std::path::Path;

use serde::Deserialize;

/// Default config file name looked up by [`SessionConfig::load_default`].
pub const CONFIG_FILE: &str = "memorymatch.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub board: BoardConfig,
    pub rules: RulesConfig,
    pub timing: TimingConfig,
}

/// Board generation limits and defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub min_grid_size: usize,
    pub max_grid_size: usize,
    /// Distinct icons available to non-numbers themes.
    pub max_icons: usize,
    /// Used when the player creating a session sends an empty theme.
    pub default_theme: String,
    /// Used when the player creating a session sends a zero grid size.
    pub default_grid_size: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            min_grid_size: 2,
            max_grid_size: 8,
            max_icons: 10,
            default_theme: crate::state::board::NUMBERS_THEME.to_string(),
            default_grid_size: 4,
        }
    }
}

/// When the rematch latch is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// One completed reset vote per session lifetime; only a hard reset
    /// releases the latch.
    #[default]
    OncePerSession,
    /// An executed reset releases the latch, so each round may vote once.
    OncePerRound,
}

/// Scoring and player rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub points_per_match: u32,
    pub max_name_len: usize,
    pub reset_policy: ResetPolicy,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            points_per_match: 10,
            max_name_len: 24,
            reset_policy: ResetPolicy::OncePerSession,
        }
    }
}

/// Timers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between the second reveal and its resolution, so every client
    /// sees both cells face-up.
    pub resolve_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            resolve_delay_ms: 600,
        }
    }
}

/// Upper bound on the resolution delay.
pub const MAX_RESOLVE_DELAY_MS: u64 = 5_000;

/// Upper bound on points awarded per matched pair.
pub const MAX_POINTS_PER_MATCH: u32 = 1_000;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "Failed to parse config: {}", msg),
            Self::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl SessionConfig {
    /// Parse a TOML document. Missing sections and keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from `path` if it exists, then apply `MEMORYMATCH_*` env overrides.
    ///
    /// A missing or unparsable file falls back to defaults with a log line;
    /// it never fails.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(cfg) => {
                    tracing::info!(path = %path.display(), "Loaded session configuration");
                    cfg
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "{e}, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load `memorymatch.toml` from the working directory.
    pub fn load_default() -> Self {
        Self::load(CONFIG_FILE)
    }

    /// Apply overrides from a key lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(n) = lookup("MEMORYMATCH_RESOLVE_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.timing.resolve_delay_ms = n;
        }
        if let Some(n) = lookup("MEMORYMATCH_POINTS_PER_MATCH").and_then(|v| v.parse().ok()) {
            self.rules.points_per_match = n;
        }
        if let Some(n) = lookup("MEMORYMATCH_DEFAULT_GRID_SIZE").and_then(|v| v.parse().ok()) {
            self.board.default_grid_size = n;
        }
        if let Some(theme) = lookup("MEMORYMATCH_DEFAULT_THEME") {
            if !theme.is_empty() {
                self.board.default_theme = theme;
            }
        }
    }

    /// Validate configuration, logging each problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.board.min_grid_size == 0 {
            problems.push("board.min_grid_size must be > 0".to_string());
        }
        if self.board.min_grid_size > self.board.max_grid_size {
            problems.push("board.min_grid_size must be <= board.max_grid_size".to_string());
        }
        if self.board.max_icons == 0 {
            problems.push("board.max_icons must be > 0".to_string());
        }
        if self.board.default_theme.is_empty() {
            problems.push("board.default_theme must not be empty".to_string());
        }
        let default_theme = crate::state::board::Theme::parse(&self.board.default_theme);
        if !crate::state::board::is_valid_layout(
            self.board.default_grid_size,
            &default_theme,
            &self.board,
        ) {
            problems.push(format!(
                "board.default_grid_size {} is not playable with theme {:?}",
                self.board.default_grid_size, self.board.default_theme
            ));
        }
        if self.rules.points_per_match > MAX_POINTS_PER_MATCH {
            problems.push(format!(
                "rules.points_per_match must be <= {}",
                MAX_POINTS_PER_MATCH
            ));
        }
        if self.rules.max_name_len == 0 {
            problems.push("rules.max_name_len must be > 0".to_string());
        }
        if self.timing.resolve_delay_ms > MAX_RESOLVE_DELAY_MS {
            problems.push(format!(
                "timing.resolve_delay_ms must be <= {}",
                MAX_RESOLVE_DELAY_MS
            ));
        }

        for problem in &problems {
            tracing::error!("{problem}");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }

    pub fn resolve_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timing.resolve_delay_ms)
    }
}
