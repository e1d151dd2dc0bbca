pub mod counter;
pub mod state;

pub use counter::{Counter, CounterDriver};
pub use state::{DiuSnapshot, ServerSnapshot};
