//! Shared utilities for the resolver.

pub mod bytes;
