//! One interactive viewing session over a loaded embedding table.
//!
//! The session owns the selection state and turns each incoming event into a
//! [`ViewFrame`]: the rows to show, their captions, and which navigation
//! buttons are live. Rendering is someone else's job.

use super::selection::{Navigation, RowRef, SelectionEvent, SelectionState, VisibleWindow};
use crate::error::Result;
use crate::table::EmbeddingTable;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PLACEHOLDER_TEXT: &str = "No image selected";

/// One thumbnail in the image panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowItem {
    pub row: RowRef,
    pub image_path: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowView {
    Placeholder { message: String },
    Items { items: Vec<WindowItem> },
}

/// Everything the rendering layer needs after an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewFrame {
    pub window: WindowView,
    pub page: usize,
    pub total_pages: usize,
    pub prev_enabled: bool,
    pub next_enabled: bool,
    /// Size of the active selection.
    pub selected: usize,
}

pub struct ViewerSession {
    table: Arc<EmbeddingTable>,
    state: SelectionState,
}

pub fn caption_for(label: &str) -> String {
    format!("Class: {}", label)
}

impl ViewerSession {
    pub fn new(table: Arc<EmbeddingTable>, page_size: usize) -> Result<Self> {
        table.check_viewable()?;
        Ok(Self {
            table,
            state: SelectionState::new(page_size)?,
        })
    }

    /// Load a table from disk and start a session over it.
    pub fn open(path: &Path, page_size: usize) -> Result<Self> {
        let table = EmbeddingTable::load(path)?;
        info!(
            "Loaded {} rows ({}D) from {}",
            table.len(),
            table.components().count(),
            path.display()
        );
        Self::new(Arc::new(table), page_size)
    }

    pub fn table(&self) -> &EmbeddingTable {
        &self.table
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Apply one event and describe the resulting view.
    ///
    /// Row references outside the table are dropped with a warning; a click
    /// on such a row leaves the state as it was.
    pub fn dispatch(&mut self, event: SelectionEvent) -> ViewFrame {
        let event = match event {
            SelectionEvent::PointClicked(row) if row >= self.table.len() => {
                warn!("Ignoring click on row {} (table has {} rows)", row, self.table.len());
                return self.frame();
            }
            SelectionEvent::RegionSelected(rows) => {
                let total = rows.len();
                let valid: Vec<RowRef> = rows
                    .into_iter()
                    .filter(|&r| r < self.table.len())
                    .collect();
                if valid.len() < total {
                    warn!(
                        "Dropped {} of {} selected rows outside the table",
                        total - valid.len(),
                        total
                    );
                }
                SelectionEvent::RegionSelected(valid)
            }
            other => other,
        };

        if let Err(e) = self.state.check(&event) {
            debug!("{}", e);
        }
        self.state = self.state.apply(&event);
        self.frame()
    }

    /// Current view without applying an event.
    pub fn frame(&self) -> ViewFrame {
        let window = match self.state.visible_window() {
            VisibleWindow::Placeholder => WindowView::Placeholder {
                message: PLACEHOLDER_TEXT.to_string(),
            },
            VisibleWindow::Items(rows) => WindowView::Items {
                items: rows
                    .iter()
                    .filter_map(|&row| {
                        self.table.row(row).map(|r| WindowItem {
                            row,
                            image_path: r.image_path.clone(),
                            caption: caption_for(&r.label),
                        })
                    })
                    .collect(),
            },
        };

        let Navigation {
            prev_enabled,
            next_enabled,
        } = self.state.navigation();

        ViewFrame {
            window,
            page: self.state.current_page(),
            total_pages: self.state.total_pages(),
            prev_enabled,
            next_enabled,
            selected: self.state.active_selection().len(),
        }
    }

    /// Swap in a new table from disk. On failure the current table and
    /// selection stay as they were.
    pub fn reload(&mut self, path: &Path) -> Result<()> {
        let table = EmbeddingTable::load(path)?;
        table.check_viewable()?;
        info!("Reloaded {} rows from {}", table.len(), path.display());

        self.table = Arc::new(table);
        self.state = SelectionState::new(self.state.page_size())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::error::AtlasError;
    use crate::table::assemble;
    use ndarray::Array2;
    use std::path::PathBuf;

    fn table(n: usize) -> Arc<EmbeddingTable> {
        let entries: Vec<CatalogEntry> = (0..n)
            .map(|i| CatalogEntry {
                path: PathBuf::from(format!("imgs/{}.png", i)),
                label: if i < 3 { "cat" } else { "dog" }.to_string(),
            })
            .collect();
        let coords = Array2::<f64>::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        Arc::new(assemble(coords.view(), &entries).unwrap())
    }

    #[test]
    fn test_initial_frame_is_placeholder() {
        let session = ViewerSession::new(table(5), 12).unwrap();
        let frame = session.frame();
        assert_eq!(
            frame.window,
            WindowView::Placeholder {
                message: PLACEHOLDER_TEXT.to_string()
            }
        );
        assert!(!frame.prev_enabled && !frame.next_enabled);
        assert_eq!(frame.selected, 0);
    }

    #[test]
    fn test_click_shows_caption() {
        let mut session = ViewerSession::new(table(5), 12).unwrap();
        let frame = session.dispatch(SelectionEvent::PointClicked(4));
        match frame.window {
            WindowView::Items { items } => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].row, 4);
                assert_eq!(items[0].image_path, "imgs/4.png");
                assert_eq!(items[0].caption, "Class: dog");
            }
            other => panic!("expected items, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_refs_dropped() {
        let mut session = ViewerSession::new(table(5), 12).unwrap();
        session.dispatch(SelectionEvent::PointClicked(1));

        let frame = session.dispatch(SelectionEvent::PointClicked(99));
        assert_eq!(session.state().active_selection(), &[1]);
        assert_eq!(frame.selected, 1);

        let frame = session.dispatch(SelectionEvent::RegionSelected(vec![0, 42, 2]));
        assert_eq!(frame.selected, 2);
        assert_eq!(session.state().active_selection(), &[0, 2]);
    }

    #[test]
    fn test_paging_frames() {
        let mut session = ViewerSession::new(table(30), 12).unwrap();
        let frame = session.dispatch(SelectionEvent::RegionSelected((0..30).collect()));
        assert_eq!((frame.page, frame.total_pages), (1, 3));
        assert!(frame.next_enabled && !frame.prev_enabled);

        session.dispatch(SelectionEvent::PageNext);
        let frame = session.dispatch(SelectionEvent::PageNext);
        assert_eq!(frame.page, 3);
        match frame.window {
            WindowView::Items { items } => assert_eq!(items.len(), 6),
            other => panic!("expected items, got {:?}", other),
        }

        let frame = session.dispatch(SelectionEvent::ViewReset);
        assert_eq!(frame.page, 1);
    }

    #[test]
    fn test_navigation_with_nothing_selected_is_harmless() {
        let mut session = ViewerSession::new(table(5), 12).unwrap();
        let frame = session.dispatch(SelectionEvent::PageNext);
        assert_eq!(frame.page, 1);
        assert!(matches!(frame.window, WindowView::Placeholder { .. }));
    }

    #[test]
    fn test_failed_reload_keeps_table() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.csv");
        std::fs::write(&bad, "a,b,c\n1,2,3\n").unwrap();

        let mut session = ViewerSession::new(table(5), 12).unwrap();
        session.dispatch(SelectionEvent::PointClicked(2));

        let err = session.reload(&bad).unwrap_err();
        assert!(matches!(err, AtlasError::Schema(_)));
        assert_eq!(session.table().len(), 5);
        assert_eq!(session.state().active_selection(), &[2]);
    }

    #[test]
    fn test_reload_replaces_table_and_clears_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("next.csv");
        table(8).save(&path).unwrap();

        let mut session = ViewerSession::new(table(5), 12).unwrap();
        session.dispatch(SelectionEvent::PointClicked(2));
        session.reload(&path).unwrap();

        assert_eq!(session.table().len(), 8);
        assert!(session.state().active_selection().is_empty());
    }

    #[test]
    fn test_oversized_3d_table_refused_but_2d_accepted() {
        use crate::table::MAX_3D_ROWS;

        let n = MAX_3D_ROWS + 1;
        let entries = vec![
            CatalogEntry {
                path: PathBuf::from("imgs/0.png"),
                label: "cat".to_string(),
            };
            n
        ];

        let flat = assemble(Array2::<f64>::zeros((n, 3)).view(), &entries).unwrap();
        match ViewerSession::new(Arc::new(flat), 12) {
            Err(AtlasError::Configuration(msg)) => assert!(msg.contains("3D")),
            Err(other) => panic!("expected configuration error, got {}", other),
            Ok(_) => panic!("3D table over the row limit was accepted"),
        }

        let plane = assemble(Array2::<f64>::zeros((n, 2)).view(), &entries).unwrap();
        let session = ViewerSession::new(Arc::new(plane), 12).unwrap();
        assert_eq!(session.table().len(), n);
    }

    #[test]
    fn test_frame_serializes_for_the_renderer() {
        let mut session = ViewerSession::new(table(5), 12).unwrap();
        let frame = session.dispatch(SelectionEvent::PointClicked(0));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["window"]["kind"], "items");
        assert_eq!(json["window"]["items"][0]["caption"], "Class: cat");
        assert_eq!(json["total_pages"], 1);
    }
}
