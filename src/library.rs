//! Prompt library operations exposed as MCP tools.
//!
//! Each call reloads the full collection through the [`StorageCoordinator`]
//! and mutations write it back in full.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::compaction::{self, CompactedPrompt, DEFAULT_COMPACTION_THRESHOLD};
use crate::error::{Error, Result};
use crate::models::{NewPrompt, Prompt, PromptFilter, PromptUpdate};
use crate::storage::{ProviderStatus, ProviderType, StorageConfig, StorageCoordinator};

/// Content preview length used by [`PromptLibrary::get_summary`].
pub const SUMMARY_PREVIEW_LENGTH: usize = 200;

/// A list entry: compacted by default, full when compaction is disabled.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ListedPrompt {
    Compact(CompactedPrompt),
    Full(Prompt),
}

impl ListedPrompt {
    pub fn id(&self) -> &str {
        match self {
            ListedPrompt::Compact(p) => &p.id,
            ListedPrompt::Full(p) => &p.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ListedPrompt::Compact(p) => &p.name,
            ListedPrompt::Full(p) => &p.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub preview: String,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CategoryStats {
    pub count: usize,
    pub tokens: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OversizedPrompt {
    pub id: String,
    pub name: String,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub total_prompts: usize,
    pub total_tokens: usize,
    pub per_category: BTreeMap<String, CategoryStats>,
    pub oversized_prompts: Vec<OversizedPrompt>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MigrationOutcome {
    NotRequested,
    /// Source and destination are the same file.
    SamePath,
    Migrated { count: usize },
    /// The new configuration stays applied; the data was not copied.
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureOutcome {
    pub provider: ProviderType,
    pub path: PathBuf,
    pub active_provider: ProviderType,
    pub previous_path: PathBuf,
    pub migration: MigrationOutcome,
}

/// The prompt library backed by a storage coordinator.
#[derive(Clone)]
pub struct PromptLibrary {
    storage: Arc<StorageCoordinator>,
}

impl PromptLibrary {
    pub fn new(storage: Arc<StorageCoordinator>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &StorageCoordinator {
        &self.storage
    }

    /// Creates a prompt. Names must be unique.
    pub async fn add(&self, new: NewPrompt) -> Result<Prompt> {
        let mut prompts = self.storage.load_prompts().await?;
        if prompts.iter().any(|p| p.name == new.name) {
            return Err(Error::DuplicateName(new.name));
        }

        let prompt = Prompt::new(new);
        prompts.push(prompt.clone());
        self.storage.save_prompts(&prompts).await?;

        info!(id = %prompt.id, name = %prompt.name, "Prompt added");
        Ok(prompt)
    }

    /// Filtered full prompts, in stored order.
    pub async fn list_prompts(&self, filter: &PromptFilter) -> Result<Vec<Prompt>> {
        let prompts = self.storage.load_prompts().await?;
        Ok(prompts.into_iter().filter(|p| filter.matches(p)).collect())
    }

    pub async fn list_compact(&self, filter: &PromptFilter) -> Result<Vec<CompactedPrompt>> {
        let prompts = self.list_prompts(filter).await?;
        Ok(compaction::compact_prompt_list(&prompts))
    }

    /// Filtered prompts, compacted unless `compact` is false.
    pub async fn list(&self, filter: &PromptFilter, compact: bool) -> Result<Vec<ListedPrompt>> {
        if compact {
            let compacted = self.list_compact(filter).await?;
            return Ok(compacted.into_iter().map(ListedPrompt::Compact).collect());
        }
        let prompts = self.list_prompts(filter).await?;
        Ok(prompts.into_iter().map(ListedPrompt::Full).collect())
    }

    /// Looks a prompt up by id, or else by case-insensitive name.
    pub async fn get(&self, id: Option<&str>, name: Option<&str>) -> Result<Prompt> {
        let id = id.filter(|id| !id.is_empty());
        let name = name.filter(|name| !name.is_empty());
        let prompts = self.storage.load_prompts().await?;

        let found = match (id, name) {
            (Some(id), _) => prompts.into_iter().find(|p| p.id == id),
            (None, Some(name)) => {
                let name = name.to_lowercase();
                prompts.into_iter().find(|p| p.name.to_lowercase() == name)
            }
            (None, None) => return Err(Error::MissingIdentifier),
        };

        found.ok_or_else(|| Error::NotFound(id.or(name).unwrap_or_default().to_string()))
    }

    /// Description and a short content preview instead of the full body.
    pub async fn get_summary(&self, id: &str) -> Result<PromptSummary> {
        let prompt = self.find_by_id(id).await?;
        Ok(PromptSummary {
            preview: compaction::extract_summary(&prompt.content, SUMMARY_PREVIEW_LENGTH),
            estimated_tokens: compaction::estimate_tokens(&prompt.content),
            id: prompt.id,
            name: prompt.name,
            description: prompt.description,
            category: prompt.category,
            tags: prompt.tags,
        })
    }

    /// Applies a partial update. Renames are not checked for collisions.
    pub async fn update(&self, id: &str, update: PromptUpdate) -> Result<Prompt> {
        let mut prompts = self.storage.load_prompts().await?;
        let prompt = prompts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        prompt.apply(update);
        let updated = prompt.clone();
        self.storage.save_prompts(&prompts).await?;

        info!(id = %updated.id, name = %updated.name, "Prompt updated");
        Ok(updated)
    }

    /// Removes a prompt and returns it.
    pub async fn delete(&self, id: &str) -> Result<Prompt> {
        let mut prompts = self.storage.load_prompts().await?;
        let index = prompts
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let removed = prompts.remove(index);
        self.storage.save_prompts(&prompts).await?;

        info!(id = %removed.id, name = %removed.name, "Prompt deleted");
        Ok(removed)
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        let prompts = self.storage.load_prompts().await?;
        let distinct: BTreeSet<String> = prompts.into_iter().map(|p| p.category).collect();
        Ok(distinct.into_iter().collect())
    }

    pub async fn tags(&self) -> Result<Vec<String>> {
        let prompts = self.storage.load_prompts().await?;
        let distinct: BTreeSet<String> = prompts.into_iter().flat_map(|p| p.tags).collect();
        Ok(distinct.into_iter().collect())
    }

    /// Estimated token usage, overall and per category.
    pub async fn context_stats(&self) -> Result<ContextStats> {
        let prompts = self.storage.load_prompts().await?;
        let mut stats = ContextStats {
            total_prompts: prompts.len(),
            ..Default::default()
        };

        for prompt in &prompts {
            let tokens = compaction::estimate_tokens(&prompt.content);
            stats.total_tokens += tokens;

            let category = stats.per_category.entry(prompt.category.clone()).or_default();
            category.count += 1;
            category.tokens += tokens;

            if compaction::needs_compaction(&prompt.content, DEFAULT_COMPACTION_THRESHOLD) {
                stats.oversized_prompts.push(OversizedPrompt {
                    id: prompt.id.clone(),
                    name: prompt.name.clone(),
                    estimated_tokens: tokens,
                });
            }
        }

        Ok(stats)
    }

    pub async fn storage_providers(&self) -> Vec<ProviderStatus> {
        self.storage.list_providers().await
    }

    pub async fn storage_config(&self) -> StorageConfig {
        self.storage.config().await
    }

    /// Switches storage to `provider`, optionally copying the current data.
    ///
    /// `path` defaults to the provider's suggested path. Migration copies from
    /// the previously active file to the newly active one; if it fails the new
    /// configuration stays in place and the failure is reported in the outcome.
    pub async fn configure_storage(
        &self,
        provider: ProviderType,
        path: Option<PathBuf>,
        migrate: bool,
    ) -> Result<ConfigureOutcome> {
        let previous = self.storage.config().await;
        let previous_provider = self.storage.active_provider().await;
        let previous_path = self.storage.active_path().await;

        let target = match path {
            Some(path) => path,
            None => self.storage.default_path(provider)?,
        };

        self.storage
            .set_config(StorageConfig {
                provider,
                path: target.clone(),
                auto_sync: true,
                fallback_to_local: true,
                last_sync_at: previous.last_sync_at,
                metadata: previous.metadata,
            })
            .await?;

        let active_provider = self.storage.active_provider().await;
        let active_path = self.storage.active_path().await;

        let migration = if !migrate {
            MigrationOutcome::NotRequested
        } else if previous_path == active_path {
            MigrationOutcome::SamePath
        } else {
            match self
                .storage
                .migrate_data(&previous_path, &active_path, Some(previous_provider))
                .await
            {
                Ok(count) => MigrationOutcome::Migrated { count },
                Err(e) => {
                    warn!(error = %e, from = %previous_path.display(), to = %active_path.display(), "Migration failed after storage was reconfigured");
                    MigrationOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            }
        };

        Ok(ConfigureOutcome {
            provider,
            path: target,
            active_provider,
            previous_path,
            migration,
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<Prompt> {
        self.storage
            .load_prompts()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
