//! Editor core for branching dialogue scenarios: conversations, the responses that lead
//! out of them, and the weighted relationships that connect a response to the next
//! conversation.

pub mod app;
pub mod builder;
pub mod connector;
pub mod constants;
pub mod editor;
pub mod error;
pub mod graph;
pub mod ids;
pub mod layout;
pub mod model;
pub mod revision;
pub mod schema;
pub mod storage;
pub mod validate;

pub use builder::ScenarioBuilder;
pub use editor::{Confirm, Editor};
pub use error::{EditorError, Result};
pub use graph::{Scenario, ScenarioSettings};
pub use layout::{LayoutConfig, LayoutEngine};
