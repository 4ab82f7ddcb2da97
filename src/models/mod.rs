mod book;
mod chapter;
mod note;
mod scene;
mod sync_state;

pub use book::Book;
pub use chapter::Chapter;
pub use note::{Note, NoteGroup};
pub use scene::{symbol_counts, Scene, SceneBody};
pub use sync_state::{SyncMeta, SyncState};
