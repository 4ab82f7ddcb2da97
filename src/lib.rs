//! Local-first book authoring store.
//!
//! Each book lives in its own SQLite store; a library index tracks the books
//! and the shared notes collection. Books and notes are exchanged with a
//! server as whole snapshots.

pub mod backup;
pub mod config;
pub mod db;
pub mod library;
pub mod models;
pub mod ordering;
pub mod server;
pub mod service;
pub mod sync;
