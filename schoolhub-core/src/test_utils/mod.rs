//! Test utilities for SchoolHub
//!
//! Fixtures, in-memory service doubles and assertions shared by unit and
//! integration tests.

pub mod assertions;
pub mod fixtures;
pub mod memory;

pub use assertions::*;
pub use fixtures::*;
pub use memory::{MemoryBlobStore, MemoryRemote};
