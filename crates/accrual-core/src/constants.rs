/// ─── Accrual Protocol Constants ─────────────────────────────────────────────

// ── Module accounts ──────────────────────────────────────────────────────────

/// Label of the account that custodies every locked coin.
pub const LOCKUP_MODULE_LABEL: &str = "module/lockup";

/// Label of the account that custodies gauge funds until they are claimed.
pub const INCENTIVES_MODULE_LABEL: &str = "module/incentives";

// ── Denominations ────────────────────────────────────────────────────────────

/// Maximum length of a denomination string.
pub const MAX_DENOM_LEN: usize = 128;

// ── Epochs ───────────────────────────────────────────────────────────────────

/// Epoch identifier that drives gauge distribution unless genesis overrides it.
pub const DEFAULT_DISTR_EPOCH_IDENTIFIER: &str = "week";

/// Seconds in a day; lock durations and epoch lengths are usually multiples.
pub const SECS_PER_DAY: i64 = 86_400;
