use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::error::RepositoryError;
use super::repository::CategoryRepository;
use super::types::{CategoryId, CategoryNode};

#[derive(Debug, Clone)]
struct Stored {
    id: CategoryId,
    name: String,
    parent_id: Option<CategoryId>,
    product_count: u32,
}

#[derive(Default)]
struct Inner {
    rows: Vec<Stored>,
    next_id: i64,
    list_calls: HashMap<Option<CategoryId>, usize>,
    failing: HashSet<Option<CategoryId>>,
    empty_lists: HashSet<CategoryId>,
}

impl Inner {
    fn node(&self, row: &Stored) -> CategoryNode {
        let children_count = self
            .rows
            .iter()
            .filter(|r| r.parent_id == Some(row.id))
            .count() as u32;
        CategoryNode {
            id: row.id,
            name: row.name.clone(),
            parent_id: row.parent_id,
            has_children: children_count > 0 || self.empty_lists.contains(&row.id),
            children_count,
            product_count: row.product_count,
        }
    }
}

/// In-process [`CategoryRepository`] backed by a flat row list.
///
/// Powers `--demo` mode and the test suite. It counts `list_children` calls
/// per parent and can be told to fail specific parents, which is what the
/// fetch deduplication and retry tests assert against.
pub struct InMemoryCategoryRepository {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl Default for InMemoryCategoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCategoryRepository {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                ..Inner::default()
            }),
            latency: None,
        }
    }

    /// Simulated network latency applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Insert a category with an explicit id.
    pub fn insert(&self, id: i64, name: &str, parent: Option<i64>) -> CategoryId {
        self.insert_with_products(id, name, parent, 0)
    }

    pub fn insert_with_products(
        &self,
        id: i64,
        name: &str,
        parent: Option<i64>,
        product_count: u32,
    ) -> CategoryId {
        let mut inner = self.lock();
        inner.rows.push(Stored {
            id: CategoryId(id),
            name: name.to_string(),
            parent_id: parent.map(CategoryId),
            product_count,
        });
        inner.next_id = inner.next_id.max(id + 1);
        CategoryId(id)
    }

    /// Advertise `has_children = true` for `id` even if it has no rows below it.
    pub fn mark_has_children(&self, id: i64) {
        self.lock().empty_lists.insert(CategoryId(id));
    }

    /// Make `list_children(parent)` fail with a 503 until [`Self::recover`].
    pub fn fail_on(&self, parent: Option<i64>) {
        self.lock().failing.insert(parent.map(CategoryId));
    }

    pub fn recover(&self, parent: Option<i64>) {
        self.lock().failing.remove(&parent.map(CategoryId));
    }

    /// Number of `list_children(parent)` calls served so far, failures included.
    pub fn list_calls(&self, parent: Option<i64>) -> usize {
        self.lock()
            .list_calls
            .get(&parent.map(CategoryId))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_list_calls(&self) -> usize {
        self.lock().list_calls.values().sum()
    }

    /// A small storefront catalog used by `--demo`.
    pub fn demo() -> Self {
        let repo = Self::new();
        repo.insert(1, "Điện thoại", None);
        repo.insert_with_products(11, "Apple", Some(1), 24);
        repo.insert_with_products(12, "Samsung", Some(1), 31);
        repo.insert(13, "Xiaomi", Some(1));
        repo.insert_with_products(131, "Redmi", Some(13), 12);
        repo.insert_with_products(132, "POCO", Some(13), 7);
        repo.insert_with_products(2, "Laptop", None, 18);
        repo.insert(3, "Phụ kiện", None);
        repo.insert(31, "Sạc & cáp", Some(3));
        repo.insert_with_products(311, "Sạc nhanh Samsung", Some(31), 9);
        repo.insert_with_products(312, "Cáp USB-C", Some(31), 22);
        repo.insert_with_products(32, "Ốp lưng", Some(3), 40);
        repo.insert(4, "Đồng hồ thông minh", None);
        repo.insert_with_products(41, "Galaxy Watch", Some(4), 6);
        repo.insert_with_products(42, "Apple Watch", Some(4), 11);
        repo
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-call; the rows are still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    async fn list_children(
        &self,
        parent: Option<CategoryId>,
    ) -> Result<Vec<CategoryNode>, RepositoryError> {
        {
            let mut inner = self.lock();
            *inner.list_calls.entry(parent).or_default() += 1;
        }
        self.simulate_latency().await;

        let inner = self.lock();
        if inner.failing.contains(&parent) {
            return Err(RepositoryError::Server {
                status: 503,
                message: Some("simulated outage".to_string()),
            });
        }
        if let Some(id) = parent {
            if !inner.rows.iter().any(|r| r.id == id) {
                return Err(RepositoryError::NotFound(id));
            }
        }
        Ok(inner
            .rows
            .iter()
            .filter(|r| r.parent_id == parent)
            .map(|r| inner.node(r))
            .collect())
    }

    async fn create(
        &self,
        name: &str,
        parent: Option<CategoryId>,
    ) -> Result<CategoryNode, RepositoryError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        if let Some(pid) = parent {
            if !inner.rows.iter().any(|r| r.id == pid) {
                return Err(RepositoryError::NotFound(pid));
            }
        }
        let id = CategoryId(inner.next_id);
        inner.next_id += 1;
        let row = Stored {
            id,
            name: name.to_string(),
            parent_id: parent,
            product_count: 0,
        };
        inner.rows.push(row.clone());
        Ok(inner.node(&row))
    }

    async fn rename(&self, id: CategoryId, name: &str) -> Result<CategoryNode, RepositoryError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        let row = inner
            .rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        row.name = name.to_string();
        let row = row.clone();
        Ok(inner.node(&row))
    }

    async fn delete(&self, id: CategoryId) -> Result<(), RepositoryError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        if !inner.rows.iter().any(|r| r.id == id) {
            return Err(RepositoryError::NotFound(id));
        }
        if inner.rows.iter().any(|r| r.parent_id == Some(id)) {
            return Err(RepositoryError::Rejected(
                "category still has subcategories".to_string(),
            ));
        }
        inner.rows.retain(|r| r.id != id);
        inner.empty_lists.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_children_reports_has_children() {
        let repo = InMemoryCategoryRepository::new();
        repo.insert(1, "Phones", None);
        repo.insert(11, "Apple", Some(1));
        repo.insert(2, "Laptops", None);

        let roots = repo.list_children(None).await.unwrap();
        assert_eq!(roots.len(), 2);
        assert!(roots[0].has_children);
        assert_eq!(roots[0].children_count, 1);
        assert!(!roots[1].has_children);
        assert_eq!(repo.list_calls(None), 1);
    }

    #[tokio::test]
    async fn test_fail_on_and_recover() {
        let repo = InMemoryCategoryRepository::new();
        repo.insert(1, "Phones", None);
        repo.fail_on(Some(1));

        assert!(repo.list_children(Some(CategoryId(1))).await.is_err());
        repo.recover(Some(1));
        assert!(repo.list_children(Some(CategoryId(1))).await.is_ok());
        assert_eq!(repo.list_calls(Some(1)), 2);
    }

    #[tokio::test]
    async fn test_mark_has_children_on_empty_parent() {
        let repo = InMemoryCategoryRepository::new();
        repo.insert(1, "Hollow", None);
        repo.mark_has_children(1);

        let roots = repo.list_children(None).await.unwrap();
        assert!(roots[0].has_children);
        assert!(repo
            .list_children(Some(CategoryId(1)))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_id() {
        let repo = InMemoryCategoryRepository::new();
        repo.insert(10, "Phones", None);
        let created = repo.create("Tablets", None).await.unwrap();
        assert_eq!(created.id, CategoryId(11));
        assert_eq!(created.parent_id, None);
    }

    #[tokio::test]
    async fn test_create_under_missing_parent_fails() {
        let repo = InMemoryCategoryRepository::new();
        let err = repo.create("Orphan", Some(CategoryId(9))).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(CategoryId(9))));
    }

    #[tokio::test]
    async fn test_delete_refuses_parent_with_children() {
        let repo = InMemoryCategoryRepository::new();
        repo.insert(1, "Phones", None);
        repo.insert(11, "Apple", Some(1));

        let err = repo.delete(CategoryId(1)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Rejected(_)));

        repo.delete(CategoryId(11)).await.unwrap();
        repo.delete(CategoryId(1)).await.unwrap();
        assert!(repo.list_children(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_updates_name() {
        let repo = InMemoryCategoryRepository::new();
        repo.insert(1, "Phones", None);
        let renamed = repo.rename(CategoryId(1), "Điện thoại").await.unwrap();
        assert_eq!(renamed.name, "Điện thoại");
        assert_eq!(repo.list_children(None).await.unwrap()[0].name, "Điện thoại");
    }

    #[tokio::test]
    async fn test_demo_catalog_shape() {
        let repo = InMemoryCategoryRepository::demo();
        let roots = repo.list_children(None).await.unwrap();
        let names: Vec<&str> = roots.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Điện thoại", "Laptop", "Phụ kiện", "Đồng hồ thông minh"]
        );
        assert!(!roots[1].has_children);
    }
}
