//! Compiles user-chosen filters into a predicate fragment.

use crate::error::{AppError, Result};
use crate::models::{FilterState, TimeWindow};
use crate::pipeline::predicate::{Condition, Predicate, SortOrder};

/// Translate filters into conditions and ordering.
///
/// Upcoming lists ascend from now, past lists descend from now. An empty
/// search adds no constraint.
pub fn compile(filters: &FilterState) -> Predicate {
    let order = match filters.window {
        TimeWindow::Upcoming => SortOrder::Ascending,
        TimeWindow::Past => SortOrder::Descending,
    };

    let mut fragment = Predicate::new()
        .and(Condition::Window(filters.window))
        .ordered(order);

    let search = filters.search.trim();
    if !search.is_empty() {
        fragment = fragment.and(Condition::NameContains(search.to_string()));
    }

    fragment
}

/// Normalize free-text search input.
pub fn normalize_search(text: &str, max_len: usize) -> Result<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() > max_len {
        return Err(AppError::validation(format!(
            "search text is longer than {max_len} characters"
        )));
    }
    if normalized.chars().any(char::is_control) {
        return Err(AppError::validation("search text contains control characters"));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scope;

    #[test]
    fn test_empty_search_adds_nothing() {
        let filters = FilterState::with_scope(Scope::InAffiliation);
        let p = compile(&filters);
        assert_eq!(p.conditions(), &[Condition::Window(TimeWindow::Upcoming)]);
        assert_eq!(p.order(), SortOrder::Ascending);
    }

    #[test]
    fn test_past_descends_with_search() {
        let filters = FilterState {
            search: "  robotics ".to_string(),
            window: TimeWindow::Past,
            scope: Scope::OutAffiliation,
        };
        let p = compile(&filters);
        assert_eq!(p.order(), SortOrder::Descending);
        assert!(p
            .conditions()
            .contains(&Condition::NameContains("robotics".to_string())));
    }

    #[test]
    fn test_normalize_search() {
        assert_eq!(normalize_search("  jazz   night ", 100).unwrap(), "jazz night");
        assert!(normalize_search(&"x".repeat(101), 100).is_err());
        assert_eq!(normalize_search(&"x".repeat(100), 100).unwrap().len(), 100);
    }
}
