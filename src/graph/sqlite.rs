/// Person graph kept in the service's own SQLite database
use super::{DeleteMode, Path, PersonGraph, Segment};
use crate::error::{AppError, AppResult};
use crate::validation::SAME_PERSON_MESSAGE;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};

/// Unordered pair key: the two names sorted
fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Clone)]
pub struct SqliteGraph {
    db: SqlitePool,
}

impl SqliteGraph {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// People adjacent to `name`, with the image on the joining edge
    async fn neighbours(&self, name: &str) -> AppResult<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT target AS other, image_url FROM photographed_with WHERE source = ?1
            UNION ALL
            SELECT source AS other, image_url FROM photographed_with WHERE target = ?1
            ORDER BY other
            "#,
        )
        .bind(name)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl PersonGraph for SqliteGraph {
    /// Breadth-first search with parent links; one shortest path at most
    async fn find_shortest_paths(&self, a: &str, b: &str) -> AppResult<Vec<Path>> {
        if a == b || !self.person_exists(a).await? || !self.person_exists(b).await? {
            return Ok(Vec::new());
        }

        // name -> (previous name, image on the edge used to get here)
        let mut parents: HashMap<String, (String, String)> = HashMap::new();
        let mut queue = VecDeque::from([a.to_string()]);
        let mut found = false;

        while let Some(current) = queue.pop_front() {
            for (next, image_url) in self.neighbours(&current).await? {
                if next == a || parents.contains_key(&next) {
                    continue;
                }
                parents.insert(next.clone(), (current.clone(), image_url));
                if next == b {
                    found = true;
                    break;
                }
                queue.push_back(next);
            }
            if found {
                break;
            }
        }

        if !found {
            return Ok(Vec::new());
        }

        let mut path = Vec::new();
        let mut cursor = b.to_string();
        while cursor != a {
            let Some((previous, image_url)) = parents.get(&cursor) else {
                return Err(AppError::Internal("Broken parent chain in path search".to_string()));
            };
            path.push(Segment::new(previous.clone(), cursor.clone(), image_url.clone()));
            cursor = previous.clone();
        }
        path.reverse();

        Ok(vec![path])
    }

    async fn create_connection(&self, a: &str, b: &str, image_url: &str) -> AppResult<()> {
        if a == b {
            return Err(AppError::Validation(SAME_PERSON_MESSAGE.to_string()));
        }
        let (low, high) = pair_key(a, b);

        let mut tx = self.db.begin().await?;
        for name in [a, b] {
            sqlx::query("INSERT OR IGNORE INTO person (name) VALUES (?1)")
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO photographed_with (source, target, image_url, pair_low, pair_high, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(pair_low, pair_high) DO NOTHING
            "#,
        )
        .bind(a)
        .bind(b)
        .bind(image_url)
        .bind(low)
        .bind(high)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::AlreadyExists("Connection".to_string()));
        }

        tx.commit().await?;
        tracing::info!(a, b, "Connection created");
        Ok(())
    }

    async fn connection_exists(&self, a: &str, b: &str) -> AppResult<bool> {
        let (low, high) = pair_key(a, b);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM photographed_with WHERE pair_low = ?1 AND pair_high = ?2",
        )
        .bind(low)
        .bind(high)
        .fetch_one(&self.db)
        .await?;
        Ok(count > 0)
    }

    async fn delete_connection(&self, a: &str, b: &str) -> AppResult<Option<String>> {
        let (low, high) = pair_key(a, b);
        let image_url: Option<String> = sqlx::query_scalar(
            "DELETE FROM photographed_with WHERE pair_low = ?1 AND pair_high = ?2 RETURNING image_url",
        )
        .bind(low)
        .bind(high)
        .fetch_optional(&self.db)
        .await?;

        if image_url.is_some() {
            tracing::info!(a, b, "Connection deleted");
        }
        Ok(image_url)
    }

    async fn person_exists(&self, name: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM person WHERE name = ?1")
            .bind(name)
            .fetch_one(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// Every statement writes, so the write lock is taken up front and a
    /// concurrent writer waits on `busy_timeout` instead of failing mid-way
    async fn delete_person(&self, name: &str, mode: DeleteMode) -> AppResult<Vec<String>> {
        let image_urls = match mode {
            DeleteMode::Cascade => {
                let mut tx = self.db.begin().await?;

                let image_urls: Vec<String> = sqlx::query_scalar(
                    "DELETE FROM photographed_with WHERE source = ?1 OR target = ?1 RETURNING image_url",
                )
                .bind(name)
                .fetch_all(&mut *tx)
                .await?;

                let deleted = sqlx::query("DELETE FROM person WHERE name = ?1")
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
                if deleted.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Err(AppError::NotFound("Person".to_string()));
                }

                tx.commit().await?;
                image_urls
            }
            DeleteMode::RefuseIfConnected => {
                let deleted = sqlx::query(
                    r#"
                    DELETE FROM person
                    WHERE name = ?1
                      AND NOT EXISTS (
                        SELECT 1 FROM photographed_with WHERE source = ?1 OR target = ?1
                      )
                    "#,
                )
                .bind(name)
                .execute(&self.db)
                .await?;

                if deleted.rows_affected() == 0 {
                    return Err(if self.person_exists(name).await? {
                        AppError::Conflict(
                            "Cannot delete person with existing relationships".to_string(),
                        )
                    } else {
                        AppError::NotFound("Person".to_string())
                    });
                }
                Vec::new()
            }
        };

        tracing::info!(name, edges = image_urls.len(), "Person deleted");
        Ok(image_urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn graph_with(edges: &[(&str, &str)]) -> SqliteGraph {
        let graph = SqliteGraph::new(test_pool().await);
        for (a, b) in edges {
            graph
                .create_connection(a, b, &format!("https://img/{}_{}.jpg", a, b))
                .await
                .unwrap();
        }
        graph
    }

    #[tokio::test]
    async fn test_direct_connection() {
        let graph = graph_with(&[("Ana Smith", "Bob Lee")]).await;

        let paths = graph.find_shortest_paths("Bob Lee", "Ana Smith").await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(
            paths[0],
            vec![Segment::new("Bob Lee", "Ana Smith", "https://img/Ana Smith_Bob Lee.jpg")]
        );
    }

    #[tokio::test]
    async fn test_shortest_of_several_routes() {
        // A-B-C-D-E and a shortcut A-X-E
        let graph = graph_with(&[
            ("A a", "B b"),
            ("B b", "C c"),
            ("C c", "D d"),
            ("D d", "E e"),
            ("A a", "X x"),
            ("X x", "E e"),
        ])
        .await;

        let paths = graph.find_shortest_paths("A a", "E e").await.unwrap();
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].start, "A a");
        assert_eq!(path[0].end, "X x");
        assert_eq!(path[1].start, "X x");
        assert_eq!(path[1].end, "E e");
        assert!(path.iter().all(|s| s.relationship == "PHOTOGRAPHED_WITH"));
    }

    #[tokio::test]
    async fn test_no_path_cases() {
        let graph = graph_with(&[("Ana Smith", "Bob Lee"), ("Cat Moss", "Dan Roe")]).await;

        assert!(graph.find_shortest_paths("Ana Smith", "Dan Roe").await.unwrap().is_empty());
        assert!(graph.find_shortest_paths("Ana Smith", "Nobody Here").await.unwrap().is_empty());
        assert!(graph.find_shortest_paths("Ana Smith", "Ana Smith").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_in_either_order_rejected() {
        let graph = graph_with(&[("Ana Smith", "Bob Lee")]).await;

        assert!(graph.connection_exists("Bob Lee", "Ana Smith").await.unwrap());
        let result = graph.create_connection("Bob Lee", "Ana Smith", "https://img/x.jpg").await;
        assert!(matches!(result, Err(AppError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_self_loop_rejected() {
        let graph = graph_with(&[]).await;
        let result = graph.create_connection("Ana Smith", "Ana Smith", "u").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(!graph.person_exists("Ana Smith").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_connection_keeps_people() {
        let graph = graph_with(&[("Ana Smith", "Bob Lee")]).await;

        let url = graph.delete_connection("Bob Lee", "Ana Smith").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://img/Ana Smith_Bob Lee.jpg"));
        assert!(!graph.connection_exists("Ana Smith", "Bob Lee").await.unwrap());
        assert!(graph.person_exists("Ana Smith").await.unwrap());
        assert!(graph.person_exists("Bob Lee").await.unwrap());

        assert!(graph.delete_connection("Ana Smith", "Bob Lee").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_person_modes() {
        let graph = graph_with(&[("Ana Smith", "Bob Lee"), ("Ana Smith", "Cat Moss")]).await;

        let refused = graph.delete_person("Ana Smith", DeleteMode::RefuseIfConnected).await;
        assert!(matches!(refused, Err(AppError::Conflict(_))));

        let mut urls = graph.delete_person("Ana Smith", DeleteMode::Cascade).await.unwrap();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "https://img/Ana Smith_Bob Lee.jpg".to_string(),
                "https://img/Ana Smith_Cat Moss.jpg".to_string(),
            ]
        );
        assert!(!graph.person_exists("Ana Smith").await.unwrap());
        assert!(graph.person_exists("Bob Lee").await.unwrap());
        assert!(!graph.connection_exists("Ana Smith", "Bob Lee").await.unwrap());

        let missing = graph.delete_person("Ana Smith", DeleteMode::Cascade).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_creates_keep_one_edge() {
        let graph = graph_with(&[]).await;

        let (first, second) = tokio::join!(
            graph.create_connection("Ana Smith", "Bob Lee", "u1"),
            graph.create_connection("Bob Lee", "Ana Smith", "u2"),
        );
        assert!(first.is_ok() ^ second.is_ok());
    }

    #[tokio::test]
    async fn test_refuse_mode_removes_isolated_person() {
        let graph = graph_with(&[("Ana Smith", "Bob Lee")]).await;
        graph.delete_connection("Ana Smith", "Bob Lee").await.unwrap();

        let urls = graph
            .delete_person("Ana Smith", DeleteMode::RefuseIfConnected)
            .await
            .unwrap();
        assert!(urls.is_empty());
        assert!(!graph.person_exists("Ana Smith").await.unwrap());

        let missing = graph.delete_person("Ana Smith", DeleteMode::RefuseIfConnected).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_deletes_remove_once() {
        let graph = graph_with(&[("Ana Smith", "Bob Lee")]).await;

        let (first, second) = tokio::join!(
            graph.delete_person("Ana Smith", DeleteMode::Cascade),
            graph.delete_person("Ana Smith", DeleteMode::Cascade),
        );
        let (ok, err) = match (first, second) {
            (Ok(urls), Err(e)) | (Err(e), Ok(urls)) => (urls, e),
            other => panic!("expected exactly one delete to succeed: {:?}", other),
        };
        assert_eq!(ok, vec!["https://img/Ana Smith_Bob Lee.jpg".to_string()]);
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(graph.person_exists("Bob Lee").await.unwrap());
    }
}
