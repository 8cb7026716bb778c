/// Application name
pub const APP_NAME: &str = "Huddle";

/// Display name used for every broadcast receiver
pub const EVERYONE_DISPLAY_NAME: &str = "Everyone";

/// Distance from the bottom (px) still treated as "at bottom"
pub const DEFAULT_BOTTOM_THRESHOLD_PX: f64 = 20.0;

/// Row height assumed for rows that have not been measured yet
pub const DEFAULT_ESTIMATED_ROW_HEIGHT_PX: f64 = 56.0;

/// Maximum characters of message text shown in a toast
pub const DEFAULT_TOAST_SNIPPET_CHARS: usize = 64;

/// Buffered events per bus before slow subscribers start lagging
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Failed/cancelled transfers remembered for retry
pub const DEFAULT_RETRY_HISTORY: usize = 32;

/// Progress percentage of a completed transfer
pub const PROGRESS_COMPLETE: u8 = 100;

/// `type_limit` value meaning "any file type"
pub const ANY_FILE_TYPE: &str = "*";
