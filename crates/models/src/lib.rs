pub mod lockout;
pub mod log;
pub mod session;
pub mod user;

// Re-export commonly used types
pub use lockout::{FailedLogin, LockoutPolicy};
pub use log::{
    DedupKey, LogFilter, LogLevel, LogQuery, LogRecord, LogRepeat, NewLogRecord, ParseLevelError,
};
pub use session::{DeviceType, NewSession, Session};
pub use user::{
    NewUser, SecurityAttributes, User, UserAccount, UserPreferences, UserProfile,
};
