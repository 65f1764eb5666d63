pub mod queue;
pub mod memory;
pub mod producer;
pub mod mailer;
pub mod worker;

pub use queue::*;
pub use memory::InMemoryJobQueue;
pub use producer::*;
pub use mailer::*;
pub use worker::*;
