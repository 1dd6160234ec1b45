//! Storage key constants.

/// Storage keys used by the client
pub struct StorageKeys;

impl StorageKeys {
    /// Access token (JWT)
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Renewal token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Cached user profile (JSON)
    pub const USER_DATA: &'static str = "user_data";

    /// Path an admin-only navigation was denied on
    pub const INTENDED_ADMIN_URL: &'static str = "intended_admin_url";

    /// Path a signed-in-only navigation was denied on
    pub const INTENDED_BOOKING_URL: &'static str = "intended_booking_url";

    /// Keys that make up a session. Always cleared together.
    pub const SESSION_KEYS: [&'static str; 3] =
        [Self::ACCESS_TOKEN, Self::REFRESH_TOKEN, Self::USER_DATA];
}

/// Where a denied navigation records the path it wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntendedPathSlot {
    /// Admin screens
    Admin,
    /// Booking and other signed-in screens
    Booking,
}

impl IntendedPathSlot {
    pub fn key(&self) -> &'static str {
        match self {
            IntendedPathSlot::Admin => StorageKeys::INTENDED_ADMIN_URL,
            IntendedPathSlot::Booking => StorageKeys::INTENDED_BOOKING_URL,
        }
    }

    /// Where a login lands when nothing was recorded in this slot.
    pub fn fallback_path(&self) -> &'static str {
        match self {
            IntendedPathSlot::Admin => "/admin",
            IntendedPathSlot::Booking => "/",
        }
    }
}
