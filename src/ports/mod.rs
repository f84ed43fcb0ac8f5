pub mod commands;
pub mod path_watcher;
pub mod stylesheet_sink;

pub use commands::{CommandSource, HostCommand};
pub use path_watcher::PathWatcher;
pub use stylesheet_sink::StylesheetSink;
