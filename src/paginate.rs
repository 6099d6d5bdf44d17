//! Cursor-bounded windows over newest-first item sequences.
//!
//! A window skips everything up to and including the item whose id equals the
//! cursor, then collects until the limit is reached. The id of the last
//! collected item becomes the next cursor.

use std::ops::ControlFlow;

use tracing::debug;

/// A collected window plus the cursor to resume from.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Incremental form of [`paginate`], fed one item at a time.
///
/// Used where items arrive in asynchronously fetched pages: the caller keeps
/// pulling while [`CursorWindow::offer`] returns `Continue`.
#[derive(Debug)]
pub struct CursorWindow<T> {
    cursor: Option<String>,
    limit: Option<usize>,
    found_cursor: bool,
    items: Vec<T>,
    next_cursor: Option<String>,
}

impl<T> CursorWindow<T> {
    pub fn new(cursor: Option<&str>, limit: Option<usize>) -> Self {
        Self {
            cursor: cursor.map(str::to_string),
            limit,
            found_cursor: cursor.is_none(),
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// True once no further item can be collected.
    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.items.len() >= limit)
    }

    pub fn offer(&mut self, id: &str, item: T) -> ControlFlow<()> {
        if self.is_full() {
            return ControlFlow::Break(());
        }

        if !self.found_cursor {
            if self.cursor.as_deref() == Some(id) {
                self.found_cursor = true;
            }
            return ControlFlow::Continue(());
        }

        self.items.push(item);
        self.next_cursor = Some(id.to_string());

        if self.is_full() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    pub fn finish(self) -> Page<T> {
        if !self.found_cursor {
            // Stale cursor: the item it pointed at is gone from the source.
            debug!(cursor = ?self.cursor, "cursor not found in source sequence");
        }
        Page {
            items: self.items,
            next_cursor: self.next_cursor,
        }
    }
}

/// Walk `items`, skipping up to and including `cursor`, collecting at most
/// `limit` items. `limit = Some(0)` never pulls from the iterator.
pub fn paginate<T, I, F>(items: I, id_of: F, cursor: Option<&str>, limit: Option<usize>) -> Page<T>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> String,
{
    let mut window = CursorWindow::new(cursor, limit);
    if window.is_full() {
        return window.finish();
    }

    for item in items {
        let id = id_of(&item);
        if window.offer(&id, item).is_break() {
            break;
        }
    }

    window.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn run(ids: &[&str], cursor: Option<&str>, limit: Option<usize>) -> Page<String> {
        paginate(seq(ids), |s| s.clone(), cursor, limit)
    }

    #[test]
    fn first_page() {
        let page = run(&["A", "B", "C", "D", "E"], None, Some(2));
        assert_eq!(page.items, seq(&["A", "B"]));
        assert_eq!(page.next_cursor.as_deref(), Some("B"));
    }

    #[test]
    fn continuation_page() {
        let page = run(&["A", "B", "C", "D", "E"], Some("B"), Some(2));
        assert_eq!(page.items, seq(&["C", "D"]));
        assert_eq!(page.next_cursor.as_deref(), Some("D"));
    }

    #[test]
    fn cursor_not_found_yields_nothing() {
        let page = run(&["A", "B", "C"], Some("Z"), None);
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn cursor_on_last_item_yields_nothing() {
        let page = run(&["A", "B", "C"], Some("C"), Some(5));
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn empty_sequence() {
        let page = run(&[], None, Some(3));
        assert_eq!(page, Page::empty());
    }

    #[test]
    fn no_limit_collects_everything() {
        let page = run(&["A", "B", "C"], None, None);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.next_cursor.as_deref(), Some("C"));
    }

    #[test]
    fn zero_limit_does_not_consume_source() {
        let source = std::iter::from_fn(|| -> Option<String> { panic!("source must not be pulled") });
        let page = paginate(source, |s| s.clone(), None, Some(0));
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn stops_pulling_once_limit_is_reached() {
        let mut pulled = 0;
        let source = std::iter::from_fn(|| {
            pulled += 1;
            Some(format!("item-{pulled}"))
        });
        let page = paginate(source, |s| s.clone(), None, Some(3));
        assert_eq!(page.items.len(), 3);
        assert_eq!(pulled, 3);
    }

    #[test]
    fn same_inputs_give_same_page() {
        let ids = ["A", "B", "C", "D", "E"];
        for cursor in [None, Some("A"), Some("C"), Some("Z")] {
            for limit in [None, Some(0), Some(1), Some(4)] {
                assert_eq!(run(&ids, cursor, limit), run(&ids, cursor, limit));
            }
        }
    }

    #[test]
    fn cursor_round_trip_has_no_gaps_or_duplicates() {
        let ids: Vec<String> = (0..17).map(|i| format!("id-{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = run(&refs, cursor.as_deref(), Some(5));
            if page.items.is_empty() {
                break;
            }
            seen.extend(page.items);
            cursor = page.next_cursor;
        }
        assert_eq!(seen, ids);
    }

    #[test]
    fn window_reports_full_and_breaks() {
        let mut window = CursorWindow::new(None, Some(1));
        assert!(window.offer("A", 1).is_break());
        assert!(window.is_full());
        assert!(window.offer("B", 2).is_break());
        let page = window.finish();
        assert_eq!(page.items, vec![1]);
        assert_eq!(page.next_cursor.as_deref(), Some("A"));
    }
}
