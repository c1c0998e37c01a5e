/// Person graph: people as nodes, "photographed with" as edges
///
/// Edges are stored with a direction but traversed undirected, and at most
/// one edge exists per unordered pair of people.
pub mod neo4j;
pub mod sqlite;

pub use neo4j::Neo4jGraph;
pub use sqlite::SqliteGraph;

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const RELATIONSHIP: &str = "PHOTOGRAPHED_WITH";

/// One hop of a path, oriented in the direction of travel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: String,
    pub relationship: String,
    pub end: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

impl Segment {
    pub fn new(start: impl Into<String>, end: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            relationship: RELATIONSHIP.to_string(),
            end: end.into(),
            image_url: image_url.into(),
        }
    }
}

pub type Path = Vec<Segment>;

/// What to do with a person's edges when the person is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Remove the person together with every edge touching them
    Cascade,
    /// Fail with `Conflict` while any edge remains
    RefuseIfConnected,
}

#[async_trait]
pub trait PersonGraph: Send + Sync {
    /// Shortest paths from `a` to `b`; empty when unconnected, unknown or equal
    async fn find_shortest_paths(&self, a: &str, b: &str) -> AppResult<Vec<Path>>;

    /// Create both people if needed and the edge between them
    ///
    /// `AlreadyExists` when the pair is already connected in either order.
    async fn create_connection(&self, a: &str, b: &str, image_url: &str) -> AppResult<()>;

    /// True when an edge joins `a` and `b` in either order
    async fn connection_exists(&self, a: &str, b: &str) -> AppResult<bool>;

    /// Remove the edge joining `a` and `b`, returning its image URL
    async fn delete_connection(&self, a: &str, b: &str) -> AppResult<Option<String>>;

    async fn person_exists(&self, name: &str) -> AppResult<bool>;

    /// Delete a person; returns the image URLs of the edges removed with them
    async fn delete_person(&self, name: &str, mode: DeleteMode) -> AppResult<Vec<String>>;
}
