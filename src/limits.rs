/// Max byte length of a villa identifier.
pub const MAX_VILLA_ID_LEN: usize = 128;

/// Max byte length of a booking reference.
pub const MAX_REFERENCE_LEN: usize = 64;

/// Max byte length of any guest field (name, email, phone).
pub const MAX_GUEST_FIELD_LEN: usize = 256;

/// Longest stay accepted, in nights.
pub const MAX_STAY_NIGHTS: i64 = 365;

pub const DEFAULT_HORIZON_MONTHS: u32 = 3;
pub const MAX_HORIZON_MONTHS: u32 = 24;

/// Calendar dates outside these years are rejected.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2100;
