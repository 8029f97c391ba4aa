//! Command implementations

mod core;
mod discover;
mod patterns;
mod serve;
mod transactions;

pub use core::{cmd_init, cmd_status, open_db};
pub use discover::cmd_discover;
pub use patterns::{
    cmd_patterns_delete, cmd_patterns_list, cmd_patterns_pause, cmd_patterns_resume,
    cmd_patterns_show, cmd_upcoming,
};
pub use serve::cmd_serve;
pub use transactions::cmd_ingest;
