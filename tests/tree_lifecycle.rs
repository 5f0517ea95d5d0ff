//! Integration tests for lazy loading: expand, collapse, cache reuse,
//! invalidation and failure recovery against the in-memory repository.

use category_tree::catalog::{CategoryId, CategoryRepository, InMemoryCategoryRepository, ParentKey};
use category_tree::tree::{project, CategoryTree, ToggleOutcome, TreeError};
use pretty_assertions::assert_eq;
use std::collections::HashSet;

fn catalog() -> InMemoryCategoryRepository {
    let repo = InMemoryCategoryRepository::new();
    repo.insert(1, "Điện thoại", None);
    repo.insert(11, "Apple", Some(1));
    repo.insert(12, "Samsung", Some(1));
    repo.insert(2, "Laptop", None);
    repo
}

fn visible_names(tree: &CategoryTree) -> Vec<String> {
    project(tree, &HashSet::new())
        .into_iter()
        .map(|row| format!("{}{}", "  ".repeat(row.depth), row.name))
        .collect()
}

#[tokio::test]
async fn test_expand_collapse_expand_fetches_once() {
    let repo = catalog();
    let mut tree = CategoryTree::new();
    tree.load_roots_now(&repo).await.unwrap();

    let first = tree.toggle_now(&repo, CategoryId(1)).await.unwrap();
    assert!(matches!(first, ToggleOutcome::FetchStarted(_)));
    assert_eq!(
        visible_names(&tree),
        vec!["Điện thoại", "  Apple", "  Samsung", "Laptop"]
    );

    assert_eq!(
        tree.toggle_now(&repo, CategoryId(1)).await.unwrap(),
        ToggleOutcome::Collapsed
    );
    assert_eq!(visible_names(&tree), vec!["Điện thoại", "Laptop"]);
    assert!(tree.is_cached(ParentKey::Node(CategoryId(1))));

    assert_eq!(
        tree.toggle_now(&repo, CategoryId(1)).await.unwrap(),
        ToggleOutcome::Expanded
    );
    assert_eq!(repo.list_calls(Some(1)), 1);
    assert_eq!(repo.list_calls(None), 1);
}

#[tokio::test]
async fn test_double_toggle_while_loading_issues_one_request() {
    let repo = catalog();
    let mut tree = CategoryTree::new();
    tree.load_roots_now(&repo).await.unwrap();

    let ToggleOutcome::FetchStarted(ticket) = tree.toggle(CategoryId(1)) else {
        panic!("expected a fetch");
    };
    assert_eq!(tree.toggle(CategoryId(1)), ToggleOutcome::AlreadyLoading);
    assert_eq!(tree.force_expand(CategoryId(1)), ToggleOutcome::AlreadyLoading);

    let result = repo.list_children(Some(CategoryId(1))).await;
    tree.complete_fetch(ticket, result).unwrap();

    assert!(tree.is_expanded(CategoryId(1)));
    assert_eq!(repo.list_calls(Some(1)), 1);
}

#[tokio::test]
async fn test_invalidation_costs_exactly_one_more_request() {
    let repo = catalog();
    let mut tree = CategoryTree::new();
    tree.load_roots_now(&repo).await.unwrap();
    tree.toggle_now(&repo, CategoryId(1)).await.unwrap();

    repo.create("Xiaomi", Some(CategoryId(1))).await.unwrap();
    assert!(tree.invalidate(ParentKey::Node(CategoryId(1))));
    assert!(!tree.is_expanded(CategoryId(1)));

    tree.toggle_now(&repo, CategoryId(1)).await.unwrap();
    assert_eq!(repo.list_calls(Some(1)), 2);
    assert_eq!(
        visible_names(&tree),
        vec!["Điện thoại", "  Apple", "  Samsung", "  Xiaomi", "Laptop"]
    );
}

#[tokio::test]
async fn test_failed_expand_can_be_retried() {
    let repo = catalog();
    let mut tree = CategoryTree::new();
    tree.load_roots_now(&repo).await.unwrap();

    repo.fail_on(Some(1));
    let err = tree.toggle_now(&repo, CategoryId(1)).await.unwrap_err();
    assert!(matches!(err, TreeError::FetchFailure { .. }));
    assert_eq!(err.key(), ParentKey::Node(CategoryId(1)));
    assert!(!tree.is_expanded(CategoryId(1)));
    assert!(!tree.is_loading(ParentKey::Node(CategoryId(1))));
    assert_eq!(visible_names(&tree), vec!["Điện thoại", "Laptop"]);

    repo.recover(Some(1));
    tree.toggle_now(&repo, CategoryId(1)).await.unwrap();
    assert!(tree.is_expanded(CategoryId(1)));
    assert_eq!(repo.list_calls(Some(1)), 2);
}

#[tokio::test]
async fn test_empty_child_list_renders_no_rows() {
    let repo = catalog();
    repo.mark_has_children(2);
    let mut tree = CategoryTree::new();
    tree.load_roots_now(&repo).await.unwrap();

    tree.toggle_now(&repo, CategoryId(2)).await.unwrap();
    assert!(tree.is_expanded(CategoryId(2)));
    assert_eq!(visible_names(&tree), vec!["Điện thoại", "Laptop"]);
}
