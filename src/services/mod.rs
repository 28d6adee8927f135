pub mod grouping;
pub mod history;
pub mod scanner;

pub use grouping::{group_image_files, FileMove, GroupError, GroupReport};
pub use history::{read_history, restore_history, HistoryRecord, RestoreReport, RestoreSelection};
pub use scanner::find_image_files;
