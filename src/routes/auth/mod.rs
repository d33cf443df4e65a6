pub mod claims;
pub mod login;
pub mod logout;
pub mod password;
pub mod session;
pub mod sessions;

pub use login::handle_login;
pub use login::handle_me;
pub use logout::handle_logout;
pub use password::handle_change_password;
pub use sessions::{list_sessions, logout_other_sessions};
