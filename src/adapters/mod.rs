pub mod console_sink;
pub mod notify_path_watcher;
pub mod stdin_commands;

pub use console_sink::ConsoleSink;
pub use notify_path_watcher::NotifyPathWatcher;
pub use stdin_commands::StdinCommands;
