pub mod matching;
pub mod types;

pub use matching::batch_touches_target;
pub use types::{SchedulerState, Stylesheet, WatchTarget};
