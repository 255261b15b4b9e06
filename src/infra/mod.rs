pub mod db;
pub mod fcm;
pub mod gateway;
pub mod memory;
pub mod pg;
pub mod store;
