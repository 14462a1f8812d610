mod logs;
mod serve;
mod storage;
mod task;

pub use logs::run_list_logs;
pub use serve::run_serve;
pub use storage::handle_storage_command;
pub use task::handle_task_command;
