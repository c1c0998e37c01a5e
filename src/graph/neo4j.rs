/// Person graph backed by a Neo4j server
use super::{DeleteMode, Path, PersonGraph, Segment};
use crate::error::{AppError, AppResult};
use crate::validation::SAME_PERSON_MESSAGE;
use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query};

fn graph_error(e: neo4rs::Error) -> AppError {
    AppError::ExternalService(format!("Neo4j: {}", e))
}

fn row_error(e: neo4rs::DeError) -> AppError {
    AppError::ExternalService(format!("Neo4j row: {}", e))
}

/// Pair up the node names and edge images of one path, in travel order
fn segments_from(names: &[String], images: &[Option<String>]) -> Path {
    names
        .windows(2)
        .zip(images)
        .map(|(pair, image)| {
            Segment::new(pair[0].clone(), pair[1].clone(), image.clone().unwrap_or_default())
        })
        .collect()
}

pub struct Neo4jGraph {
    graph: Graph,
}

impl Neo4jGraph {
    pub async fn connect(uri: &str, user: &str, password: &str) -> AppResult<Self> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .build()
            .map_err(graph_error)?;
        let graph = Graph::connect(config).await.map_err(graph_error)?;

        tracing::info!(uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Run a query that yields a single count column
    async fn count(&self, q: Query) -> AppResult<i64> {
        let mut rows = self.graph.execute(q).await.map_err(graph_error)?;
        match rows.next().await.map_err(graph_error)? {
            Some(row) => row.get::<i64>("count").map_err(row_error),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl PersonGraph for Neo4jGraph {
    async fn find_shortest_paths(&self, a: &str, b: &str) -> AppResult<Vec<Path>> {
        if a == b {
            return Ok(Vec::new());
        }

        let mut rows = self
            .graph
            .execute(
                query(
                    "MATCH (a:Person {name: $a}), (b:Person {name: $b}) \
                     MATCH p = shortestPath((a)-[:PHOTOGRAPHED_WITH*]-(b)) \
                     RETURN [n IN nodes(p) | n.name] AS names, \
                            [r IN relationships(p) | r.imageUrl] AS images",
                )
                .param("a", a)
                .param("b", b),
            )
            .await
            .map_err(graph_error)?;

        let mut paths = Vec::new();
        while let Some(row) = rows.next().await.map_err(graph_error)? {
            let names: Vec<String> = row.get("names").map_err(row_error)?;
            let images: Vec<Option<String>> = row.get("images").map_err(row_error)?;
            paths.push(segments_from(&names, &images));
        }

        Ok(paths)
    }

    /// Check-and-create in one statement; writing `_lock` on both people
    /// takes their write locks before the duplicate check runs
    async fn create_connection(&self, a: &str, b: &str, image_url: &str) -> AppResult<()> {
        if a == b {
            return Err(AppError::Validation(SAME_PERSON_MESSAGE.to_string()));
        }

        let mut rows = self
            .graph
            .execute(
                query(
                    "MERGE (p1:Person {name: $a}) \
                     MERGE (p2:Person {name: $b}) \
                     SET p1._lock = true, p2._lock = true \
                     WITH p1, p2 \
                     OPTIONAL MATCH (p1)-[existing:PHOTOGRAPHED_WITH]-(p2) \
                     WITH p1, p2, count(existing) AS found \
                     FOREACH (_ IN CASE WHEN found = 0 THEN [1] ELSE [] END | \
                         CREATE (p1)-[:PHOTOGRAPHED_WITH {imageUrl: $imageUrl}]->(p2)) \
                     REMOVE p1._lock, p2._lock \
                     RETURN found = 0 AS created",
                )
                .param("a", a)
                .param("b", b)
                .param("imageUrl", image_url),
            )
            .await
            .map_err(graph_error)?;

        let created = match rows.next().await.map_err(graph_error)? {
            Some(row) => row.get::<bool>("created").map_err(row_error)?,
            None => false,
        };

        if !created {
            return Err(AppError::AlreadyExists("Connection".to_string()));
        }

        tracing::info!(a, b, "Connection created");
        Ok(())
    }

    async fn connection_exists(&self, a: &str, b: &str) -> AppResult<bool> {
        let count = self
            .count(
                query(
                    "MATCH (:Person {name: $a})-[r:PHOTOGRAPHED_WITH]-(:Person {name: $b}) \
                     RETURN count(r) AS count",
                )
                .param("a", a)
                .param("b", b),
            )
            .await?;
        Ok(count > 0)
    }

    async fn delete_connection(&self, a: &str, b: &str) -> AppResult<Option<String>> {
        let mut rows = self
            .graph
            .execute(
                query(
                    "MATCH (:Person {name: $a})-[r:PHOTOGRAPHED_WITH]-(:Person {name: $b}) \
                     WITH r LIMIT 1 \
                     WITH r, r.imageUrl AS imageUrl \
                     DELETE r \
                     RETURN imageUrl",
                )
                .param("a", a)
                .param("b", b),
            )
            .await
            .map_err(graph_error)?;

        match rows.next().await.map_err(graph_error)? {
            Some(row) => {
                let image_url: Option<String> = row.get("imageUrl").map_err(row_error)?;
                tracing::info!(a, b, "Connection deleted");
                Ok(Some(image_url.unwrap_or_default()))
            }
            None => Ok(None),
        }
    }

    async fn person_exists(&self, name: &str) -> AppResult<bool> {
        let count = self
            .count(query("MATCH (p:Person {name: $name}) RETURN count(p) AS count").param("name", name))
            .await?;
        Ok(count > 0)
    }

    async fn delete_person(&self, name: &str, mode: DeleteMode) -> AppResult<Vec<String>> {
        if !self.person_exists(name).await? {
            return Err(AppError::NotFound("Person".to_string()));
        }

        let statement = match mode {
            DeleteMode::Cascade => {
                "MATCH (p:Person {name: $name}) \
                 OPTIONAL MATCH (p)-[r:PHOTOGRAPHED_WITH]-() \
                 WITH p, collect(r.imageUrl) AS urls \
                 DETACH DELETE p \
                 RETURN urls"
            }
            DeleteMode::RefuseIfConnected => {
                "MATCH (p:Person {name: $name}) \
                 OPTIONAL MATCH (p)-[r:PHOTOGRAPHED_WITH]-() \
                 WITH p, collect(r.imageUrl) AS urls \
                 WHERE size(urls) = 0 \
                 DELETE p \
                 RETURN urls"
            }
        };

        let mut rows = self
            .graph
            .execute(query(statement).param("name", name))
            .await
            .map_err(graph_error)?;

        match rows.next().await.map_err(graph_error)? {
            Some(row) => {
                let urls: Vec<String> = row.get("urls").map_err(row_error)?;
                tracing::info!(name, edges = urls.len(), "Person deleted");
                Ok(urls)
            }
            None => Err(AppError::Conflict(
                "Cannot delete person with existing relationships".to_string(),
            )),
        }
    }
}
