//! Credential and session core for the clinic booking backend.
//!
//! Password hashing, access/refresh token issuance, per-route rate limiting
//! and role checks, plus the register/login/refresh/change-password
//! operations that combine them and an axum binding that serves them.

pub mod auth;
pub mod config;
pub mod db;
pub mod rate_limit;
pub mod routes;

#[cfg(test)]
mod tests;
