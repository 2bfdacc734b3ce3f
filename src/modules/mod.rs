pub mod append_string;
pub mod event_source;
pub mod folder_size;
pub mod write_items;
pub mod write_string;

pub use append_string::{AppendString, AppendStringStage};
pub use event_source::EventSource;
pub use folder_size::FolderSizeProbe;
pub use write_items::WriteItemsToFile;
pub use write_string::WriteStringToFile;
