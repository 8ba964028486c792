//! Gateway adapters. Only the scriptable in-memory backend lives here; a
//! platform billing client would be a sibling adapter.

pub mod in_memory;
