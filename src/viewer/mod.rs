//! Interactive side: selection state and the session that drives it.

mod selection;
mod session;

pub use selection::{Navigation, RowRef, SelectionEvent, SelectionState, VisibleWindow};
pub use session::{caption_for, ViewFrame, ViewerSession, WindowItem, WindowView, PLACEHOLDER_TEXT};
