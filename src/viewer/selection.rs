//! Selection and pagination state machine.
//!
//! [`SelectionState::apply`] is a total function of (state, event): every
//! event yields a new state, events that cannot move the page are no-ops.

use crate::error::{AtlasError, Result};
use serde::Serialize;

/// Index of a row in the loaded embedding table.
pub type RowRef = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    /// A single point was clicked.
    PointClicked(RowRef),
    /// A lasso or box selection, in the order the plot reported it.
    RegionSelected(Vec<RowRef>),
    /// Autoscale or double-click on the plot.
    ViewReset,
    PageNext,
    PagePrev,
}

impl SelectionEvent {
    fn is_navigation(&self) -> bool {
        matches!(self, SelectionEvent::PageNext | SelectionEvent::PagePrev)
    }
}

/// What the image panel should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibleWindow<'a> {
    /// Nothing selected.
    Placeholder,
    Items(&'a [RowRef]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub prev_enabled: bool,
    pub next_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    active_selection: Vec<RowRef>,
    /// 1-based.
    current_page: usize,
    page_size: usize,
}

impl SelectionState {
    pub fn new(page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(AtlasError::Configuration(
                "page_size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            active_selection: Vec::new(),
            current_page: 1,
            page_size,
        })
    }

    pub fn active_selection(&self) -> &[RowRef] {
        &self.active_selection
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_pages(&self) -> usize {
        self.active_selection.len().div_ceil(self.page_size).max(1)
    }

    fn paginated(&self) -> bool {
        self.active_selection.len() > self.page_size
    }

    /// Report events that have nothing to act on. Applying them anyway is
    /// still safe: they leave the state untouched.
    pub fn check(&self, event: &SelectionEvent) -> Result<()> {
        if event.is_navigation() && self.active_selection.is_empty() {
            return Err(AtlasError::SelectionOutOfRange(format!(
                "{:?} with no active selection",
                event
            )));
        }
        Ok(())
    }

    /// Next state after `event`.
    pub fn apply(&self, event: &SelectionEvent) -> SelectionState {
        match event {
            SelectionEvent::PointClicked(row) => self.replace_selection(vec![*row]),
            SelectionEvent::RegionSelected(rows) => self.replace_selection(rows.clone()),
            SelectionEvent::ViewReset => self.at_page(1),
            SelectionEvent::PageNext => {
                let nav = self.navigation();
                if nav.next_enabled {
                    self.at_page(self.current_page + 1)
                } else {
                    self.clone()
                }
            }
            SelectionEvent::PagePrev => {
                let nav = self.navigation();
                if nav.prev_enabled {
                    self.at_page(self.current_page - 1)
                } else {
                    self.clone()
                }
            }
        }
    }

    /// A new selection always starts on the first page, even when it holds
    /// the same rows as the previous one.
    fn replace_selection(&self, rows: Vec<RowRef>) -> SelectionState {
        SelectionState {
            active_selection: rows,
            current_page: 1,
            page_size: self.page_size,
        }
    }

    fn at_page(&self, page: usize) -> SelectionState {
        SelectionState {
            active_selection: self.active_selection.clone(),
            current_page: page.clamp(1, self.total_pages()),
            page_size: self.page_size,
        }
    }

    /// Slice of the selection on the current page.
    pub fn visible_window(&self) -> VisibleWindow<'_> {
        if self.active_selection.is_empty() {
            return VisibleWindow::Placeholder;
        }
        let start = (self.current_page - 1) * self.page_size;
        let end = (start + self.page_size).min(self.active_selection.len());
        VisibleWindow::Items(&self.active_selection[start.min(end)..end])
    }

    /// Both buttons are off while everything fits on one page.
    pub fn navigation(&self) -> Navigation {
        if !self.paginated() {
            return Navigation {
                prev_enabled: false,
                next_enabled: false,
            };
        }
        Navigation {
            prev_enabled: self.current_page > 1,
            next_enabled: self.current_page < self.total_pages(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(n: usize, page_size: usize) -> SelectionState {
        SelectionState::new(page_size)
            .unwrap()
            .apply(&SelectionEvent::RegionSelected((0..n).collect()))
    }

    #[test]
    fn test_zero_page_size_rejected() {
        assert!(matches!(
            SelectionState::new(0),
            Err(AtlasError::Configuration(_))
        ));
    }

    #[test]
    fn test_paging_through_37_rows() {
        let mut state = state_with(37, 12);
        assert_eq!(state.total_pages(), 4);
        assert_eq!(
            state.navigation(),
            Navigation { prev_enabled: false, next_enabled: true }
        );

        for _ in 0..3 {
            state = state.apply(&SelectionEvent::PageNext);
        }
        assert_eq!(state.current_page(), 4);
        assert!(!state.navigation().next_enabled);
        assert!(state.navigation().prev_enabled);
        assert_eq!(state.visible_window(), VisibleWindow::Items(&[36]));

        // Pressing next on the last page changes nothing
        assert_eq!(state.apply(&SelectionEvent::PageNext), state);

        for _ in 0..3 {
            state = state.apply(&SelectionEvent::PagePrev);
        }
        assert_eq!(state.current_page(), 1);
        assert!(!state.navigation().prev_enabled);
        assert!(state.navigation().next_enabled);
        assert_eq!(state.apply(&SelectionEvent::PagePrev), state);
    }

    #[test]
    fn test_middle_page_window() {
        let state = state_with(37, 12).apply(&SelectionEvent::PageNext);
        let expected: Vec<RowRef> = (12..24).collect();
        assert_eq!(state.visible_window(), VisibleWindow::Items(&expected));
    }

    #[test]
    fn test_empty_selection_shows_placeholder() {
        let state = SelectionState::new(12).unwrap();
        assert_eq!(state.visible_window(), VisibleWindow::Placeholder);
        assert_eq!(state.total_pages(), 1);
        assert_eq!(
            state.navigation(),
            Navigation { prev_enabled: false, next_enabled: false }
        );
    }

    #[test]
    fn test_navigation_without_selection_is_noop() {
        let state = SelectionState::new(12).unwrap();
        for event in [SelectionEvent::PageNext, SelectionEvent::PagePrev] {
            assert!(matches!(
                state.check(&event),
                Err(AtlasError::SelectionOutOfRange(_))
            ));
            assert_eq!(state.apply(&event), state);
        }
        assert!(state.check(&SelectionEvent::ViewReset).is_ok());
    }

    #[test]
    fn test_small_region_single_page() {
        let state = SelectionState::new(12)
            .unwrap()
            .apply(&SelectionEvent::RegionSelected(vec![9, 4, 7, 1, 30]));
        assert_eq!(state.total_pages(), 1);
        assert_eq!(state.visible_window(), VisibleWindow::Items(&[9, 4, 7, 1, 30]));
        assert_eq!(
            state.navigation(),
            Navigation { prev_enabled: false, next_enabled: false }
        );
    }

    #[test]
    fn test_exactly_one_full_page_has_no_navigation() {
        let state = state_with(12, 12);
        assert_eq!(state.total_pages(), 1);
        assert!(!state.navigation().next_enabled);
    }

    #[test]
    fn test_new_selection_resets_page() {
        let rows: Vec<RowRef> = (0..30).collect();
        let state = SelectionState::new(10)
            .unwrap()
            .apply(&SelectionEvent::RegionSelected(rows.clone()))
            .apply(&SelectionEvent::PageNext)
            .apply(&SelectionEvent::PageNext);
        assert_eq!(state.current_page(), 3);

        // Same rows, new identity: back to page 1
        let reselected = state.apply(&SelectionEvent::RegionSelected(rows));
        assert_eq!(reselected.current_page(), 1);

        let clicked = state.apply(&SelectionEvent::PointClicked(17));
        assert_eq!(clicked.current_page(), 1);
        assert_eq!(clicked.active_selection(), &[17]);
    }

    #[test]
    fn test_view_reset_keeps_selection() {
        let state = state_with(25, 10)
            .apply(&SelectionEvent::PageNext)
            .apply(&SelectionEvent::ViewReset);
        assert_eq!(state.current_page(), 1);
        assert_eq!(state.active_selection().len(), 25);
    }
}
