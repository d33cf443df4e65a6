pub mod access;
pub mod auth_hooks;
pub mod billing;
pub mod workspace_service;
