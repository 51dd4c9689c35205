//! Offset pagination for large result sets

use serde::Serialize;

/// A single page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page_number: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Slice a list into a 1-indexed page
///
/// Concatenating `items` across pages 1..=total_pages reproduces the
/// input in order; `has_next` is false exactly when `page_number` is at
/// or past the last page.
pub fn paginate<T: Clone>(items: &[T], page_number: usize, page_size: usize) -> Page<T> {
    let page_number = page_number.max(1);
    let total_count = items.len();
    let total_pages = if page_size == 0 { 0 } else { total_count.div_ceil(page_size) };

    let start = (page_number - 1).saturating_mul(page_size).min(total_count);
    let end = start.saturating_add(page_size).min(total_count);

    Page {
        items: items[start..end].to_vec(),
        total_count,
        page_number,
        page_size,
        total_pages,
        has_next: page_number < total_pages,
        has_previous: page_number > 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_concatenate_to_original() {
        let items: Vec<i32> = (0..23).collect();
        let mut collected = Vec::new();
        let mut page_number = 1;

        loop {
            let page = paginate(&items, page_number, 5);
            collected.extend(page.items.clone());
            if !page.has_next {
                break;
            }
            page_number += 1;
        }

        assert_eq!(collected, items);
        assert_eq!(page_number, 5);
    }

    #[test]
    fn test_has_next_boundary() {
        let items: Vec<i32> = (0..10).collect();

        assert!(paginate(&items, 1, 5).has_next);
        assert!(!paginate(&items, 2, 5).has_next);
        assert!(!paginate(&items, 3, 5).has_next);
        assert!(paginate(&items, 3, 5).items.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let items: Vec<i32> = vec![];
        let page = paginate(&items, 1, 10);

        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn test_exact_multiple() {
        let items: Vec<i32> = (0..10).collect();
        let page = paginate(&items, 2, 5);

        assert_eq!(page.items, vec![5, 6, 7, 8, 9]);
        assert_eq!(page.total_pages, 2);
        assert!(!page.has_next);
        assert!(page.has_previous);
    }
}
