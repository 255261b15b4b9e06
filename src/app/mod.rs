pub mod audience;
pub mod delivery;
pub mod error;
pub mod lifecycle;
pub mod notifications;
pub mod tokens;
