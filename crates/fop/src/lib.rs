pub mod break_timer;
pub mod config;
pub mod decisions;
pub mod field_of_play;
mod handle;
pub mod records;
pub mod roster;
pub mod scheduler;
pub mod timer;
pub mod tone;

pub use config::FopConfig;
pub use field_of_play::FieldOfPlay;
pub use handle::{spawn_field_of_play, FopHandle};
pub use scheduler::{ManualScheduler, Scheduler, Task, TokioScheduler};
pub use tone::{SilentTones, ToneSink};
