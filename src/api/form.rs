/// Request body extractors that reject through `AppError`
use crate::{error::AppError, validation::upload::UploadedFile};
use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    Json,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// JSON body; malformed or mistyped bodies become `Validation` errors
#[derive(Debug, Clone)]
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        Ok(AppJson(value))
    }
}

/// Text fields and the `file` part of a multipart form
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

#[async_trait]
impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        Self::read(multipart).await
    }
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid form data: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "file" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid file upload: {}", e)))?;

                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid form field: {}", e)))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Text field value; empty when absent
    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Two names and a file, or `MissingFields` naming all three
    pub fn connection_parts(self) -> Result<(String, String, UploadedFile), AppError> {
        const FIELDS: [&str; 3] = ["firstPersonFullName", "secondPersonFullName", "file"];

        let first = self.text(FIELDS[0]).to_string();
        let second = self.text(FIELDS[1]).to_string();
        match self.file {
            Some(file) if !first.is_empty() && !second.is_empty() => Ok((first, second, file)),
            _ => Err(AppError::missing(&FIELDS)),
        }
    }
}
