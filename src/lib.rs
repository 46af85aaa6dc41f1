pub mod auth;
pub mod config;
pub mod consts;
pub mod dispatch;
pub mod logging;
pub mod server;
pub mod tasks;
