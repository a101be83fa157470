pub mod builder;
pub mod events;
pub mod executor;

pub use builder::{Flow, FlowBuilder};
pub use events::ExecEvent;
pub use executor::{Executor, ExecutorConfig};
