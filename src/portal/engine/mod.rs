//! Provider/task execution engine.

pub mod context;
pub mod provider;
pub mod session;
pub mod task;

pub use context::{RunEnv, TaskContext};
pub use provider::{Provider, RunReport};
pub use session::{AuthResult, Branch, Session, Vars};
pub use task::{Exhausted, ResponseHandler, Step, Task, TaskKind, WaitCondition, WaitTask};
