/// Connection lookups and admin edits of the person graph
///
/// Lookups resolve every edge image to a short-lived signed link. Admin
/// edits keep the graph and the permanent bucket in step and refresh the
/// suggestion index.
use crate::{
    error::{AppError, AppResult},
    graph::{DeleteMode, PersonGraph, Segment},
    metrics,
    object_store::{connection_key, key_from_url, Bucket, ObjectStore, PRESIGN_TTL},
    suggestions::SuggestionIndex,
    validation::{
        upload::{UploadValidator, UploadedFile},
        validate_person_pair,
    },
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const CONNECTION_EXISTS_MESSAGE: &str = "This connection already exists in the system.";

/// One path between two people, with a signed link per segment image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPath {
    pub segments: Vec<Segment>,
    /// Parallel to `segments`; `None` where no link could be made
    #[serde(rename = "imageUrls")]
    pub image_urls: Vec<Option<String>>,
}

pub struct ConnectionService {
    graph: Arc<dyn PersonGraph>,
    objects: Arc<dyn ObjectStore>,
    suggestions: Arc<SuggestionIndex>,
    validator: Arc<UploadValidator>,
}

impl ConnectionService {
    pub fn new(
        graph: Arc<dyn PersonGraph>,
        objects: Arc<dyn ObjectStore>,
        suggestions: Arc<SuggestionIndex>,
        validator: Arc<UploadValidator>,
    ) -> Self {
        Self {
            graph,
            objects,
            suggestions,
            validator,
        }
    }

    /// Shortest paths between two people; empty when they are not connected
    pub async fn find_connections(&self, name1: &str, name2: &str) -> AppResult<Vec<ConnectionPath>> {
        if name1.is_empty() || name2.is_empty() {
            return Err(AppError::missing(&["name1", "name2"]));
        }

        let paths = self.graph.find_shortest_paths(name1, name2).await?;
        metrics::record_connection_lookup(!paths.is_empty());
        tracing::debug!(name1, name2, paths = paths.len(), "Connection lookup");

        let mut connections = Vec::with_capacity(paths.len());
        for segments in paths {
            let image_urls =
                join_all(segments.iter().map(|segment| self.sign_image(&segment.image_url))).await;
            connections.push(ConnectionPath {
                segments,
                image_urls,
            });
        }

        Ok(connections)
    }

    /// Fresh signed link for an edge image; failures are logged, not returned
    async fn sign_image(&self, image_url: &str) -> Option<String> {
        if image_url.is_empty() {
            return None;
        }

        let key = key_from_url(image_url);
        match self
            .objects
            .presigned_url(Bucket::Permanent, &key, PRESIGN_TTL)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(key, "Failed to presign image: {}", e);
                None
            }
        }
    }

    /// Add a connection with its image to the permanent collection
    ///
    /// Returns the image URL recorded on the new edge.
    pub async fn admin_upload(&self, first: &str, second: &str, file: &UploadedFile) -> AppResult<String> {
        validate_person_pair(first, second)?;
        if let Err(e) = self.validator.validate(file).await {
            metrics::record_upload("admin", "rejected");
            return Err(e);
        }

        if self.graph.connection_exists(first, second).await? {
            return Err(AppError::Conflict(CONNECTION_EXISTS_MESSAGE.to_string()));
        }

        let key = connection_key(first, second, &file.extension());
        let image_url = self.objects.public_url(Bucket::Permanent, &key);

        self.graph
            .create_connection(first, second, &image_url)
            .await
            .map_err(|e| match e {
                AppError::AlreadyExists(_) => {
                    AppError::Conflict(CONNECTION_EXISTS_MESSAGE.to_string())
                }
                other => other,
            })?;

        if let Err(e) = self
            .objects
            .put_object(Bucket::Permanent, &key, file.bytes.clone(), file.stored_content_type())
            .await
        {
            // An edge without its image would break lookups
            if let Err(undo) = self.graph.delete_connection(first, second).await {
                tracing::error!(first, second, "Failed to remove edge after upload failure: {}", undo);
            }
            metrics::record_upload("admin", "failed");
            return Err(e);
        }

        self.suggestions.invalidate().await;
        metrics::record_graph_mutation("create_connection");
        metrics::record_upload("admin", "success");
        tracing::info!(first, second, key, "Connection uploaded");

        Ok(image_url)
    }

    /// Remove the edge between two people and, best effort, its image
    pub async fn delete_connection(&self, first: &str, second: &str) -> AppResult<()> {
        if first.is_empty() || second.is_empty() {
            return Err(AppError::missing(&["firstPersonFullName", "secondPersonFullName"]));
        }

        let image_url = self
            .graph
            .delete_connection(first, second)
            .await?
            .ok_or_else(|| AppError::NotFound("Connection".to_string()))?;

        self.delete_images(std::slice::from_ref(&image_url)).await;
        self.suggestions.invalidate().await;
        metrics::record_graph_mutation("delete_connection");
        Ok(())
    }

    /// Remove a person with every edge touching them; returns the image count
    pub async fn delete_person(&self, name: &str) -> AppResult<usize> {
        if name.is_empty() {
            return Err(AppError::missing(&["fullName"]));
        }

        let image_urls = self.graph.delete_person(name, DeleteMode::Cascade).await?;
        self.delete_images(&image_urls).await;
        self.suggestions.invalidate().await;
        metrics::record_graph_mutation("delete_person");

        Ok(image_urls.len())
    }

    /// Graph state is already committed; storage failures are only logged
    async fn delete_images(&self, image_urls: &[String]) {
        for image_url in image_urls.iter().filter(|url| !url.is_empty()) {
            let key = key_from_url(image_url);
            if let Err(e) = self.objects.delete_object(Bucket::Permanent, &key).await {
                tracing::warn!(key, "Failed to delete image: {}", e);
            }
        }
    }
}
