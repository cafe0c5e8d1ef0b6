//! HTTP dashboard: JSON API plus a server-rendered catalog page.

pub mod http;
pub mod views;

pub use http::DashboardServer;
