//! Chat engine configuration loaded from environment variables.
//!
//! Every setting has a default so a session can start with zero
//! configuration.

use huddle_shared::constants::{
    DEFAULT_BOTTOM_THRESHOLD_PX, DEFAULT_ESTIMATED_ROW_HEIGHT_PX, DEFAULT_EVENT_CAPACITY,
    DEFAULT_RETRY_HISTORY, DEFAULT_TOAST_SNIPPET_CHARS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Distance from the bottom still counted as "at bottom".
    /// Env: `HUDDLE_BOTTOM_THRESHOLD_PX`
    /// Default: `20`
    pub bottom_threshold_px: f64,

    /// Height assumed for rows that were never measured.
    /// Env: `HUDDLE_ESTIMATED_ROW_HEIGHT_PX`
    /// Default: `56`
    pub estimated_row_height_px: f64,

    /// Characters of message text shown in a toast.
    /// Env: `HUDDLE_TOAST_SNIPPET_CHARS`
    /// Default: `64`
    pub toast_snippet_chars: usize,

    /// Events buffered per subscriber.
    /// Env: `HUDDLE_EVENT_CAPACITY`
    /// Default: `256`
    pub event_capacity: usize,

    /// Failed transfers remembered for retry (0 disables retry).
    /// Env: `HUDDLE_RETRY_HISTORY`
    /// Default: `32`
    pub retry_history: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bottom_threshold_px: DEFAULT_BOTTOM_THRESHOLD_PX,
            estimated_row_height_px: DEFAULT_ESTIMATED_ROW_HEIGHT_PX,
            toast_snippet_chars: DEFAULT_TOAST_SNIPPET_CHARS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            retry_history: DEFAULT_RETRY_HISTORY,
        }
    }
}

impl ChatConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(px) = parse_var(&lookup, "HUDDLE_BOTTOM_THRESHOLD_PX", non_negative) {
            config.bottom_threshold_px = px;
        }

        if let Some(px) = parse_var(&lookup, "HUDDLE_ESTIMATED_ROW_HEIGHT_PX", positive) {
            config.estimated_row_height_px = px;
        }

        if let Some(n) = parse_var(&lookup, "HUDDLE_TOAST_SNIPPET_CHARS", |n: &usize| *n > 0) {
            config.toast_snippet_chars = n;
        }

        if let Some(n) = parse_var(&lookup, "HUDDLE_EVENT_CAPACITY", |n: &usize| *n > 0) {
            config.event_capacity = n;
        }

        if let Some(n) = parse_var(&lookup, "HUDDLE_RETRY_HISTORY", |_: &usize| true) {
            config.retry_history = n;
        }

        config
    }
}

fn non_negative(v: &f64) -> bool {
    v.is_finite() && *v >= 0.0
}

fn positive(v: &f64) -> bool {
    v.is_finite() && *v > 0.0
}

fn parse_var<T, F, P>(lookup: &F, name: &str, valid: P) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
    P: Fn(&T) -> bool,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => Some(value),
        _ => {
            tracing::warn!(variable = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}
