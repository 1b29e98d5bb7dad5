//! Report definition and artifact registries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    schedule::calculate_next_generation,
    types::{
        ArtifactQuery, GeneratedReportArtifact, ReportDefinitionRequest, ScheduledReportDefinition,
    },
};
use crate::{
    store::{ArtifactStore, Repository},
    types::CommandError,
};

/// Artifacts returned by [`ReportManager::list_artifacts`] when the query sets no limit.
pub const DEFAULT_ARTIFACT_LIMIT: usize = 50;

const DEFINITION: &str = "report definition";
const ARTIFACT: &str = "report artifact";

/// Owns scheduled report definitions, the artifact index and the artifact store.
pub struct ReportManager {
    definitions: Repository<ScheduledReportDefinition>,
    artifacts: Repository<GeneratedReportArtifact>,
    store: Arc<dyn ArtifactStore>,
}

impl ReportManager {
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { definitions: Repository::new(), artifacts: Repository::new(), store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Loads the artifact index from the store. Returns the number of artifacts indexed.
    ///
    /// # Errors
    ///
    /// Propagates the store's error.
    pub async fn rehydrate(&self) -> Result<usize, crate::store::StoreError> {
        let index = self.store.load_index().await?;
        let count = index.len();
        for artifact in index {
            self.artifacts.upsert(artifact);
        }
        debug!(count, "artifact index rehydrated");
        Ok(count)
    }

    /// Validates and registers a new definition. Its first run is scheduled relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or `AlreadyExists` if the requested id is taken.
    pub fn create_definition(
        &self,
        request: ReportDefinitionRequest,
        now: DateTime<Utc>,
    ) -> Result<Arc<ScheduledReportDefinition>, CommandError> {
        request.validate()?;

        let id = request.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let definition = ScheduledReportDefinition {
            id: id.clone(),
            name: request.name.unwrap_or_default().trim().to_string(),
            description: request.description,
            format: request.format,
            next_fire_time: calculate_next_generation(now, &request.schedule),
            schedule: request.schedule,
            data_source: request.data_source.unwrap_or_default().trim().to_string(),
            filters: request.filters,
            recipients: request.recipients,
            distribution_methods: request.distribution_methods,
            is_active: request.is_active,
            last_generated_time: None,
            generation_count: 0,
            failure_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        if !self.definitions.insert_new(definition) {
            return Err(CommandError::AlreadyExists { entity: DEFINITION, id });
        }

        info!(definition_id = %id, "report definition created");
        self.definitions.get(&id).ok_or_else(|| CommandError::not_found(DEFINITION, &id))
    }

    /// Replaces a definition's configuration, keeping its history counters.
    ///
    /// `next_fire_time` is recomputed from `now` with the new schedule.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or `NotFound` for an unknown id.
    pub fn update_definition(
        &self,
        id: &str,
        request: ReportDefinitionRequest,
        now: DateTime<Utc>,
    ) -> Result<Arc<ScheduledReportDefinition>, CommandError> {
        request.validate()?;

        let updated = self
            .definitions
            .update(id, |definition| {
                definition.name = request.name.unwrap_or_default().trim().to_string();
                definition.description = request.description;
                definition.format = request.format;
                definition.next_fire_time = calculate_next_generation(now, &request.schedule);
                definition.schedule = request.schedule;
                definition.data_source = request.data_source.unwrap_or_default().trim().to_string();
                definition.filters = request.filters;
                definition.recipients = request.recipients;
                definition.distribution_methods = request.distribution_methods;
                definition.is_active = request.is_active;
                definition.updated_at = now;
            })
            .ok_or_else(|| CommandError::not_found(DEFINITION, id))?;

        info!(definition_id = %id, "report definition updated");
        Ok(updated)
    }

    /// Activates or deactivates a definition. Takes effect on the next scheduler tick.
    ///
    /// Reactivation reschedules from `now` so missed periods are not replayed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn set_definition_active(
        &self,
        id: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Arc<ScheduledReportDefinition>, CommandError> {
        let updated = self
            .definitions
            .update(id, |definition| {
                if active && !definition.is_active {
                    definition.next_fire_time =
                        calculate_next_generation(now, &definition.schedule);
                }
                definition.is_active = active;
                definition.updated_at = now;
            })
            .ok_or_else(|| CommandError::not_found(DEFINITION, id))?;

        info!(definition_id = %id, active, "report definition activation changed");
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn deactivate_definition(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Arc<ScheduledReportDefinition>, CommandError> {
        self.set_definition_active(id, false, now)
    }

    /// Removes a definition. Its artifacts stay until retention removes them.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn delete_definition(
        &self,
        id: &str,
    ) -> Result<Arc<ScheduledReportDefinition>, CommandError> {
        let removed =
            self.definitions.delete(id).ok_or_else(|| CommandError::not_found(DEFINITION, id))?;
        info!(definition_id = %id, "report definition deleted");
        Ok(removed)
    }

    #[must_use]
    pub fn get_definition(&self, id: &str) -> Option<Arc<ScheduledReportDefinition>> {
        self.definitions.get(id)
    }

    /// All definitions ordered by name.
    #[must_use]
    pub fn list_definitions(&self) -> Vec<Arc<ScheduledReportDefinition>> {
        let mut definitions = self.definitions.list();
        definitions.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        definitions
    }

    #[must_use]
    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    /// Active definitions whose `next_fire_time` has been reached, earliest first.
    #[must_use]
    pub fn due_definitions(&self, now: DateTime<Utc>) -> Vec<Arc<ScheduledReportDefinition>> {
        let mut due = self.definitions.filter(|d| d.is_active && d.next_fire_time <= now);
        due.sort_by(|a, b| a.next_fire_time.cmp(&b.next_fire_time).then_with(|| a.id.cmp(&b.id)));
        due
    }

    /// Records the outcome of one generation attempt.
    ///
    /// The schedule always advances relative to `now`. Returns `None` if the definition was
    /// deleted while the attempt ran.
    pub(crate) fn record_attempt(
        &self,
        id: &str,
        now: DateTime<Utc>,
        error: Option<String>,
    ) -> Option<Arc<ScheduledReportDefinition>> {
        self.definitions.update(id, |definition| {
            definition.next_fire_time = calculate_next_generation(now, &definition.schedule);
            match error {
                None => {
                    definition.last_generated_time = Some(now);
                    definition.generation_count += 1;
                    definition.last_error = None;
                }
                Some(error) => {
                    definition.failure_count += 1;
                    definition.last_error = Some(error);
                }
            }
        })
    }

    /// Indexes a stored artifact. The index keeps one entry per storage key: an older entry
    /// whose payload was just overwritten is dropped, so retention never deletes a payload
    /// another entry still points at.
    pub(crate) fn index_artifact(&self, artifact: GeneratedReportArtifact) {
        let shadowed = self
            .artifacts
            .filter(|a| a.storage_key == artifact.storage_key && a.id != artifact.id);
        for stale in shadowed {
            debug!(
                artifact_id = %stale.id,
                storage_key = %stale.storage_key,
                "payload overwritten, dropping stale index entry"
            );
            self.artifacts.delete(&stale.id);
        }
        self.artifacts.upsert(artifact);
    }

    pub(crate) fn unindex_artifact(&self, id: &str) -> Option<Arc<GeneratedReportArtifact>> {
        self.artifacts.delete(id)
    }

    #[must_use]
    pub fn get_artifact(&self, id: &str) -> Option<Arc<GeneratedReportArtifact>> {
        self.artifacts.get(id)
    }

    /// Artifacts matching `query`, newest first.
    #[must_use]
    pub fn list_artifacts(&self, query: &ArtifactQuery) -> Vec<Arc<GeneratedReportArtifact>> {
        let mut artifacts = self.artifacts.filter(|a| {
            query.format.map_or(true, |f| a.format == f)
                && query.definition_id.as_deref().map_or(true, |d| a.definition_id == d)
        });
        artifacts.sort_by(|a, b| b.generated_at.cmp(&a.generated_at).then_with(|| a.id.cmp(&b.id)));
        artifacts.truncate(query.limit.unwrap_or(DEFAULT_ARTIFACT_LIMIT));
        artifacts
    }

    /// Every indexed artifact, unordered.
    #[must_use]
    pub fn all_artifacts(&self) -> Vec<Arc<GeneratedReportArtifact>> {
        self.artifacts.list()
    }

    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    /// Reads a stored payload back.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the artifact or its payload is missing, `Storage` on store failure.
    pub async fn read_artifact(&self, id: &str) -> Result<Vec<u8>, CommandError> {
        let artifact = self.artifacts.get(id).ok_or_else(|| CommandError::not_found(ARTIFACT, id))?;
        self.store
            .get(&artifact.storage_key)
            .await
            .map_err(|e| CommandError::Storage(e.to_string()))?
            .ok_or_else(|| CommandError::not_found(ARTIFACT, id))
    }

    /// Deletes the stored payload, then the index entry.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id. On a store failure the index entry is kept and
    /// `Storage` is returned.
    pub async fn delete_artifact(
        &self,
        id: &str,
    ) -> Result<Arc<GeneratedReportArtifact>, CommandError> {
        let artifact = self.artifacts.get(id).ok_or_else(|| CommandError::not_found(ARTIFACT, id))?;

        if let Err(e) = self.store.delete(&artifact.storage_key).await {
            warn!(artifact_id = %id, error = %e, "failed to delete artifact payload");
            return Err(CommandError::Storage(e.to_string()));
        }

        self.artifacts.delete(id);
        info!(artifact_id = %id, "report artifact deleted");
        Ok(artifact)
    }
}
