//! Bracelet Core - Domain model of the platform client
//!
//! This crate contains the I/O-free core shared by the adapters:
//! - **Query model and encoder** - `QueryParams`, `Filter`, `QueryEncoder`
//! - **Session token** - `OauthToken` with decoded access-token claims
//! - **Domain entities** - `User`, `Patient`, `Study`, ... and the `Resource` trait
//! - **Error codes** - UI-context, API-context and blob storage code spaces
//! - **Port definitions** - Traits for adapters: `ITokenStorage`, `IErrorReporter`, `INotifier`
//! - **Configuration** - YAML-backed `Config`
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure logic with no network access.
//! Ports define trait interfaces that adapter crates implement.

pub mod config;
pub mod domain;
pub mod ports;
