use super::{MediaCatalog, ServiceError};
use crate::model::{AddOutcome, CatalogEntry, CatalogImage};
use async_trait::async_trait;
use reqwest::Response;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection and library settings for a Radarr instance.
pub struct RadarrSettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub quality_profile_id: u32,
    pub root_folder: String,
}

impl std::fmt::Debug for RadarrSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadarrSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("quality_profile_id", &self.quality_profile_id)
            .field("root_folder", &self.root_folder)
            .finish()
    }
}

/// Movie resource as returned by `/api/v3/movie` and `/api/v3/movie/lookup`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovieResource {
    title: String,
    #[serde(default)]
    year: u16,
    #[serde(default)]
    tmdb_id: u64,
    #[serde(default)]
    has_file: bool,
    title_slug: Option<String>,
    #[serde(default)]
    images: Vec<CatalogImage>,
}

impl From<MovieResource> for CatalogEntry {
    fn from(movie: MovieResource) -> Self {
        CatalogEntry {
            title: movie.title,
            year: movie.year,
            catalog_id: movie.tmdb_id,
            has_file: movie.has_file,
            slug: movie.title_slug,
            images: movie.images,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddMovieRequest<'a> {
    title: &'a str,
    quality_profile_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    title_slug: Option<&'a str>,
    images: &'a [CatalogImage],
    tmdb_id: u64,
    year: u16,
    root_folder_path: &'a str,
    monitored: bool,
    add_options: AddOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddOptions {
    search_for_movie: bool,
}

/// Radarr API v3 client.
pub struct RadarrClient {
    client: reqwest::Client,
    settings: RadarrSettings,
}

impl RadarrClient {
    pub fn new(client: reqwest::Client, settings: RadarrSettings) -> Self {
        Self { client, settings }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/v3/{}",
            self.settings.base_url.trim_end_matches('/'),
            path
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ServiceError> {
        let response = tokio::time::timeout(
            REQUEST_TIMEOUT,
            request
                .header("X-Api-Key", self.settings.api_key.expose_secret())
                .send(),
        )
        .await
        .map_err(|_| ServiceError::Timeout)?
        .map_err(ServiceError::Network)?;

        match response.status().as_u16() {
            200..=299 => Ok(response),
            401 | 403 => Err(ServiceError::Auth("Radarr rejected the API key".into())),
            404 => Err(ServiceError::NotFound(response.url().path().to_string())),
            status => Err(ServiceError::HttpStatus(status)),
        }
    }

    async fn library(&self) -> Result<Vec<MovieResource>, ServiceError> {
        self.send(self.client.get(self.endpoint("movie")))
            .await?
            .json::<Vec<MovieResource>>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MediaCatalog for RadarrClient {
    async fn lookup(&self, title: &str) -> Result<Option<CatalogEntry>, ServiceError> {
        let results = self
            .send(
                self.client
                    .get(self.endpoint("movie/lookup"))
                    .query(&[("term", title)]),
            )
            .await?
            .json::<Vec<MovieResource>>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;

        let Some(found) = results.into_iter().next() else {
            return Ok(None);
        };
        let mut entry = CatalogEntry::from(found);

        // Lookup results carry library state inconsistently; ask the library
        entry.has_file = self.has_file(entry.catalog_id).await?;
        Ok(Some(entry))
    }

    async fn list(&self) -> Result<Vec<CatalogEntry>, ServiceError> {
        Ok(self
            .library()
            .await?
            .into_iter()
            .map(CatalogEntry::from)
            .collect())
    }

    async fn add(&self, entry: &CatalogEntry) -> Result<AddOutcome, ServiceError> {
        if self
            .library()
            .await?
            .iter()
            .any(|m| m.tmdb_id == entry.catalog_id)
        {
            tracing::debug!(
                title = %entry.title,
                year = entry.year,
                "Movie already in Radarr library"
            );
            return Ok(AddOutcome::AlreadyPresent);
        }

        let body = AddMovieRequest {
            title: &entry.title,
            quality_profile_id: self.settings.quality_profile_id,
            title_slug: entry.slug.as_deref(),
            images: &entry.images,
            tmdb_id: entry.catalog_id,
            year: entry.year,
            root_folder_path: &self.settings.root_folder,
            monitored: true,
            add_options: AddOptions {
                search_for_movie: false,
            },
        };
        self.send(self.client.post(self.endpoint("movie")).json(&body))
            .await?;
        Ok(AddOutcome::Added)
    }
}
