pub mod chaos;
pub mod command;
pub mod config;
pub mod event;
pub mod history;
pub mod hvac;
pub mod room;
pub mod snapshot;
pub mod strain;

pub use chaos::*;
pub use command::*;
pub use config::*;
pub use event::*;
pub use history::*;
pub use hvac::*;
pub use room::*;
pub use snapshot::*;
pub use strain::*;
