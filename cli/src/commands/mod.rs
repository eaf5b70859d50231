mod helpers;
mod history;
mod import;
mod log;
mod stats;
mod user;

pub(crate) use history::cmd_history;
pub(crate) use import::{cmd_export, cmd_import};
pub(crate) use log::{cmd_delete, cmd_log};
pub(crate) use stats::{cmd_stats, cmd_weekly};
pub(crate) use user::{cmd_user_add, cmd_user_list};

pub(crate) use helpers::resolve_cli_user;
