//! rolegate gateway server.
//!
//! One binary serves one tenant: an OIDC relying party with server-side
//! sessions, an authentication gate and role gates for protected views, and
//! federated logout. Tenants differ only in configuration.

pub mod app;
pub mod auth;
pub mod config;
pub mod pages;
