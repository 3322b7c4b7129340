//! Weir - Distributed-Safe Leaky Bucket Rate Limiting
//!
//! This crate implements a rate limiter whose per-key state lives in an
//! external shared key-value store (Redis in production), so that limiter
//! instances across processes or hosts observe the same usage for the same
//! key. Usage leaks back at a constant `limit / window` rate; within one
//! instance a single worker task serializes every read-modify-write cycle
//! against the store. Across instances the store is shared without
//! coordination, a documented last-write-wins trade-off.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
