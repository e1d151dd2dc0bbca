pub mod diu;
pub mod monitor;
pub mod server;

pub use diu::{Diu, DiuEvent, DiuField};
pub use monitor::spawn_monitor;
pub use server::DiuServer;
