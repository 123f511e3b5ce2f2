pub mod interaction;
pub mod steps;

pub use interaction::{Action, Interaction, PageInfo};
pub use steps::{LoadedRecording, Recording, RecordingSummary, Step};
