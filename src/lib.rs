//! Quillpost - A small blog CMS
//!
//! This library provides session authentication, password reset, and the
//! article publish workflow behind the Quillpost HTTP API.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
