//! Shared utilities for backend services.
//!
//! This crate provides common functionality used across services:
//! - JWT issuance and validation (HS256)
//! - Symmetric encryption (AES-256-GCM) and hashing
//! - Password hashing with Argon2id
//! - File helpers (content-type checks, thumbnails)
//! - Struct validation with readable error messages

pub mod crypto;
pub mod fileio;
pub mod jwt;
pub mod password;
pub mod validation;
