//! Adapters implementing the domain ports: in-memory storage, the live and
//! offline explanation generators, and clocks.

pub mod clock;
pub mod in_memory;
pub mod llm;
pub mod offline;
