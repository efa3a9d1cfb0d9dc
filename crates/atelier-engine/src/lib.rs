pub mod backend;
pub mod manager;
pub mod mock;
pub mod stream;

pub use crate::backend::{EngineKind, EngineRegistry};
pub use crate::manager::{LoadRequest, ModelManager};
pub use crate::mock::MockEngine;
pub use crate::stream::blocking_chunk_stream;
