pub mod activity;
pub mod api_key;
pub mod billing_event;
pub mod session;
pub mod user;
pub mod workspace;
