//! MCP tool server over the prompt library.
//!
//! Every tool answers with a single markdown text block. Request errors become
//! `invalid_request`; storage failures become `internal_error`.

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::error;

use crate::compaction::{self, ContextStage, DEFAULT_COMPACTION_THRESHOLD};
use crate::error::Error;
use crate::library::{ConfigureOutcome, ContextStats, MigrationOutcome, PromptLibrary, PromptSummary};
use crate::models::{NewPrompt, Prompt, PromptFilter, PromptUpdate};
use crate::storage::{ProviderStatus, ProviderType, StorageConfig};

const INSTRUCTIONS: &str = "Personal library of AI prompts. List prompts compactly with \
list_prompts, preview with get_prompt_summary and fetch the full body with get_prompt only \
when needed. Storage can live locally or in a synced cloud folder (configure_storage).";

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddPromptRequest {
    /// Identifying name of the prompt
    pub name: String,
    /// What the prompt does
    pub description: String,
    /// The prompt text
    pub content: String,
    /// Category, e.g. development, writing, analysis
    pub category: String,
    /// Optional tags
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ListPromptsRequest {
    /// Only prompts in this category (case-insensitive)
    pub category: Option<String>,
    /// Only prompts carrying any of these tags (case-insensitive)
    pub tags: Option<Vec<String>>,
    /// Substring searched in name and description
    pub search: Option<String>,
    /// Metadata only (default true). Pass false for full records.
    pub compact: Option<bool>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct GetPromptRequest {
    /// Prompt id
    pub id: Option<String>,
    /// Prompt name, used when no id is given (case-insensitive)
    pub name: Option<String>,
    /// Disclosure stage: metadata, summary or full (default full)
    pub stage: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IdRequest {
    /// Prompt id
    pub id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdatePromptRequest {
    /// Id of the prompt to update
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    /// Replaces the whole tag list
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ConfigureStorageRequest {
    /// One of local, onedrive, googledrive, dropbox, icloud
    pub provider: String,
    /// Prompts file path; defaults to the provider's suggested location
    pub path: Option<String>,
    /// Copy the current prompts to the new location
    #[serde(default)]
    pub migrate: bool,
}

#[derive(Clone)]
pub struct PromptServer {
    library: PromptLibrary,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl PromptServer {
    pub fn new(library: PromptLibrary) -> Self {
        Self {
            library,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Add a new AI prompt to the library. Requires name, description, content and category; tags are optional.")]
    async fn add_prompt(
        &self,
        Parameters(req): Parameters<AddPromptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let prompt = self
            .library
            .add(NewPrompt {
                name: req.name,
                description: req.description,
                content: req.content,
                category: req.category,
                tags: req.tags,
            })
            .await
            .map_err(to_mcp_error)?;

        Ok(text(format!(
            "✅ Prompt \"{}\" added.\n\nID: {}\nCategory: {}\nTags: {}",
            prompt.name,
            prompt.id,
            prompt.category,
            join_tags(&prompt.tags)
        )))
    }

    #[tool(description = "List prompts with optional category, tag and search filters. Returns metadata only unless compact is false.")]
    async fn list_prompts(
        &self,
        Parameters(req): Parameters<ListPromptsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let filter = PromptFilter {
            category: req.category,
            tags: req.tags,
            search: req.search,
        };

        if req.compact.unwrap_or(true) {
            let compacted = self.library.list_compact(&filter).await.map_err(to_mcp_error)?;
            if compacted.is_empty() {
                return Ok(text(NO_MATCHES));
            }
            return Ok(text(compaction::format_prompt_list_compact(&compacted)));
        }

        let prompts = self.library.list_prompts(&filter).await.map_err(to_mcp_error)?;
        Ok(text(format_prompt_list_full(&prompts)))
    }

    #[tool(description = "Get a prompt by id or name. Stage selects how much is returned: metadata, summary or full (default).")]
    async fn get_prompt(
        &self,
        Parameters(req): Parameters<GetPromptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let stage = match req.stage.as_deref() {
            Some(stage) => stage.parse::<ContextStage>().map_err(to_mcp_error)?,
            None => ContextStage::Full,
        };
        let prompt = self
            .library
            .get(req.id.as_deref(), req.name.as_deref())
            .await
            .map_err(to_mcp_error)?;

        if stage == ContextStage::Full {
            return Ok(text(format_prompt(&prompt)));
        }

        let staged = compaction::load_prompt_at_stage(&prompt, stage);
        let json = serde_json::to_string_pretty(&staged)
            .map_err(|e| McpError::internal_error(format!("Failed to render prompt: {e}"), None))?;
        Ok(text(json))
    }

    #[tool(description = "Get a prompt's description and a short content preview instead of the full body.")]
    async fn get_prompt_summary(
        &self,
        Parameters(req): Parameters<IdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let summary = self.library.get_summary(&req.id).await.map_err(to_mcp_error)?;
        Ok(text(format_summary(&summary)))
    }

    #[tool(description = "Update an existing prompt. Only the supplied fields change.")]
    async fn update_prompt(
        &self,
        Parameters(req): Parameters<UpdatePromptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let update = PromptUpdate {
            name: req.name,
            description: req.description,
            content: req.content,
            category: req.category,
            tags: req.tags,
        };
        let prompt = self.library.update(&req.id, update).await.map_err(to_mcp_error)?;
        Ok(text(format!("✅ Prompt \"{}\" updated.", prompt.name)))
    }

    #[tool(description = "Delete a prompt by id.")]
    async fn delete_prompt(
        &self,
        Parameters(req): Parameters<IdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let prompt = self.library.delete(&req.id).await.map_err(to_mcp_error)?;
        Ok(text(format!("🗑️ Prompt \"{}\" deleted.", prompt.name)))
    }

    #[tool(description = "List every category in use.")]
    async fn get_categories(&self) -> Result<CallToolResult, McpError> {
        let categories = self.library.categories().await.map_err(to_mcp_error)?;
        if categories.is_empty() {
            return Ok(text("No categories yet. Add some prompts first!"));
        }
        Ok(text(format!("🏷️ **Categories:**\n\n{}", bullets(&categories))))
    }

    #[tool(description = "List every tag in use.")]
    async fn get_tags(&self) -> Result<CallToolResult, McpError> {
        let tags = self.library.tags().await.map_err(to_mcp_error)?;
        if tags.is_empty() {
            return Ok(text("No tags yet. Add tags to your prompts!"));
        }
        Ok(text(format!("🔖 **Tags:**\n\n{}", bullets(&tags))))
    }

    #[tool(description = "Estimated token usage of the library, per category, plus prompts large enough to warrant summaries.")]
    async fn get_context_stats(&self) -> Result<CallToolResult, McpError> {
        let stats = self.library.context_stats().await.map_err(to_mcp_error)?;
        Ok(text(format_context_stats(&stats)))
    }

    #[tool(description = "List storage providers, their availability and which one is active.")]
    async fn list_storage_providers(&self) -> Result<CallToolResult, McpError> {
        let providers = self.library.storage_providers().await;
        Ok(text(format_providers(&providers)))
    }

    #[tool(description = "Show the current storage configuration.")]
    async fn get_storage_config(&self) -> Result<CallToolResult, McpError> {
        let config = self.library.storage_config().await;
        Ok(text(format_storage_config(&config)))
    }

    #[tool(description = "Switch storage to another provider (local, onedrive, googledrive, dropbox, icloud), optionally migrating existing prompts.")]
    async fn configure_storage(
        &self,
        Parameters(req): Parameters<ConfigureStorageRequest>,
    ) -> Result<CallToolResult, McpError> {
        let provider: ProviderType = req.provider.parse().map_err(to_mcp_error)?;
        let outcome = self
            .library
            .configure_storage(provider, req.path.map(PathBuf::from), req.migrate)
            .await
            .map_err(to_mcp_error)?;
        Ok(text(format_configure_outcome(&outcome)))
    }
}

#[tool_handler]
impl ServerHandler for PromptServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }
}

const NO_MATCHES: &str = "No prompts match the given criteria.";

fn text(body: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(body)])
}

fn to_mcp_error(err: Error) -> McpError {
    if err.is_user_error() {
        return McpError::invalid_request(err.to_string(), None);
    }
    // Keep the io source in the message; Display alone drops it.
    let err = anyhow::Error::from(err);
    error!(error = %format!("{err:#}"), "Tool execution failed");
    McpError::internal_error(format!("Tool execution failed: {err:#}"), None)
}

fn join_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        "none".to_string()
    } else {
        tags.join(", ")
    }
}

fn bullets(items: &[String]) -> String {
    items.iter().map(|item| format!("• {item}")).collect::<Vec<_>>().join("\n")
}

fn format_prompt_list_full(prompts: &[Prompt]) -> String {
    if prompts.is_empty() {
        return NO_MATCHES.to_string();
    }

    let list: Vec<String> = prompts
        .iter()
        .map(|p| {
            format!(
                "📌 **{}** ({})\n   Category: {}\n   Tags: {}\n   Description: {}\n   Created: {}\n",
                p.name,
                p.id,
                p.category,
                join_tags(&p.tags),
                p.description,
                p.created_at.format("%Y-%m-%d")
            )
        })
        .collect();
    format!("📚 **{} prompt(s) found**\n\n{}", prompts.len(), list.join("\n"))
}

fn format_prompt(prompt: &Prompt) -> String {
    let mut out = format!(
        "📝 **{}**\n\n**Description:** {}\n\n**Category:** {}\n**Tags:** {}\n\n**Content:**\n\n{}\n\n---\nID: {}\nCreated: {}\nUpdated: {}",
        prompt.name,
        prompt.description,
        prompt.category,
        join_tags(&prompt.tags),
        prompt.content,
        prompt.id,
        prompt.created_at.format("%Y-%m-%d"),
        prompt.updated_at.format("%Y-%m-%d"),
    );

    if compaction::needs_compaction(&prompt.content, DEFAULT_COMPACTION_THRESHOLD) {
        out.push_str(&format!(
            "\n\n⚠️ **Large content** (~{} tokens). Consider get_prompt_summary for a preview.",
            compaction::estimate_tokens(&prompt.content)
        ));
    }
    out
}

fn format_summary(summary: &PromptSummary) -> String {
    format!(
        "📋 **{}** (summary)\n\n**Description:** {}\n\n**Category:** {}\n**Tags:** {}\n\n**Preview:** {}\n\n---\nEstimated tokens: ~{}\n💡 Use `get_prompt` with id \"{}\" for the full content.",
        summary.name,
        summary.description,
        summary.category,
        join_tags(&summary.tags),
        summary.preview,
        summary.estimated_tokens,
        summary.id
    )
}

fn format_context_stats(stats: &ContextStats) -> String {
    let mut categories: Vec<_> = stats.per_category.iter().collect();
    categories.sort_by(|a, b| b.1.tokens.cmp(&a.1.tokens));
    let category_list: Vec<String> = categories
        .iter()
        .map(|(name, s)| format!("• **{name}**: {} prompt(s), ~{} tokens", s.count, s.tokens))
        .collect();

    let mut out = format!(
        "📊 **Context Stats**\n\n**Total:** {} prompts, ~{} tokens\n\n**By category:**\n{}\n\n",
        stats.total_prompts,
        stats.total_tokens,
        category_list.join("\n")
    );

    if !stats.oversized_prompts.is_empty() {
        let large: Vec<String> = stats
            .oversized_prompts
            .iter()
            .map(|p| format!("• {}: ~{} tokens", p.name, p.estimated_tokens))
            .collect();
        out.push_str(&format!(
            "**⚠️ Large prompts (>{DEFAULT_COMPACTION_THRESHOLD} tokens):**\n{}\n\n",
            large.join("\n")
        ));
    }

    out.push_str("💡 Filter `list_prompts` to reduce context usage.");
    out
}

fn format_providers(providers: &[ProviderStatus]) -> String {
    let list: Vec<String> = providers
        .iter()
        .map(|p| {
            format!(
                "{} **{}** ({})\n   {}{}",
                if p.active { "✅" } else { "⭕" },
                p.name,
                p.provider_type,
                if p.available { "✓ Available" } else { "✗ Not available" },
                if p.active { "\n   ← Active" } else { "" }
            )
        })
        .collect();
    format!("☁️ **Storage Providers**\n\n{}", list.join("\n"))
}

fn format_storage_config(config: &StorageConfig) -> String {
    let yes_no = |flag: bool| if flag { "Yes" } else { "No" };
    let last_sync = config
        .last_sync_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Never".to_string());

    let mut out = format!(
        "⚙️ **Storage Configuration**\n\n**Provider:** {}\n**Path:** {}\n**Auto Sync:** {}\n**Local Fallback:** {}\n**Last Sync:** {}\n",
        config.provider,
        config.path.display(),
        yes_no(config.auto_sync),
        yes_no(config.fallback_to_local),
        last_sync
    );
    if let Some(device) = config.metadata.as_ref().and_then(|m| m.device_name.as_deref()) {
        out.push_str(&format!("**Device:** {device}\n"));
    }
    out
}

fn format_configure_outcome(outcome: &ConfigureOutcome) -> String {
    let header = match &outcome.migration {
        MigrationOutcome::Failed { .. } => "⚠️ Storage configured but migration failed",
        _ => "✅ Storage configured.",
    };
    let mut out = format!(
        "{header}\n\n**Provider:** {}\n**Path:** {}\n",
        outcome.provider,
        outcome.path.display()
    );

    if outcome.active_provider != outcome.provider {
        out.push_str(&format!(
            "**Active provider:** {} (fallback, {} is not available)\n",
            outcome.active_provider, outcome.provider
        ));
    }

    match &outcome.migration {
        MigrationOutcome::Migrated { count } => {
            out.push_str(&format!("**Data migrated:** {count} prompt(s)\n"));
        }
        MigrationOutcome::Failed { error } => {
            out.push_str(&format!(
                "**Error:** {error}\n\nCopy {} to the new location manually.\n",
                outcome.previous_path.display()
            ));
        }
        MigrationOutcome::SamePath => {}
        MigrationOutcome::NotRequested => {
            if outcome.previous_path != outcome.path {
                out.push_str("\n💡 Call `configure_storage` with `migrate: true` to move your prompts automatically.\n");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{CategoryStats, OversizedPrompt};
    use rmcp::model::ErrorCode;
    use std::io;

    fn prompt(content: &str) -> Prompt {
        Prompt::new(NewPrompt {
            name: "Code Review".to_string(),
            description: "Reviews code".to_string(),
            content: content.to_string(),
            category: "development".to_string(),
            tags: vec![],
        })
    }

    #[test]
    fn test_user_errors_are_invalid_requests() {
        let err = to_mcp_error(Error::NotFound("abc".to_string()));
        assert_eq!(err.code, ErrorCode::INVALID_REQUEST);
        assert_eq!(err.message, "Prompt not found: abc");

        let err = to_mcp_error(Error::UnknownProvider("floppy".to_string()));
        assert_eq!(err.code, ErrorCode::INVALID_REQUEST);
    }

    #[test]
    fn test_io_errors_are_internal_with_source() {
        let err = to_mcp_error(Error::SaveFailed {
            path: PathBuf::from("/tmp/prompts.json"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        });
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
        assert!(err.message.contains("/tmp/prompts.json"));
        assert!(err.message.contains("denied"));
    }

    #[test]
    fn test_format_prompt_warns_on_large_content() {
        let small = format_prompt(&prompt("short"));
        assert!(small.contains("**Tags:** none"));
        assert!(!small.contains("Large content"));

        let large = format_prompt(&prompt(&"x".repeat(4004)));
        assert!(large.contains("⚠️ **Large content** (~1001 tokens)"));
    }

    #[test]
    fn test_context_stats_sorted_by_tokens() {
        let mut stats = ContextStats {
            total_prompts: 3,
            total_tokens: 1600,
            ..Default::default()
        };
        stats
            .per_category
            .insert("alpha".to_string(), CategoryStats { count: 2, tokens: 100 });
        stats
            .per_category
            .insert("beta".to_string(), CategoryStats { count: 1, tokens: 1500 });
        stats.oversized_prompts.push(OversizedPrompt {
            id: "1".to_string(),
            name: "Huge".to_string(),
            estimated_tokens: 1500,
        });

        let out = format_context_stats(&stats);
        let beta = out.find("**beta**").unwrap();
        let alpha = out.find("**alpha**").unwrap();
        assert!(beta < alpha);
        assert!(out.contains("• Huge: ~1500 tokens"));
    }

    #[test]
    fn test_configure_outcome_mentions_fallback_and_failure() {
        let outcome = ConfigureOutcome {
            provider: ProviderType::Dropbox,
            path: PathBuf::from("/cloud/prompts.json"),
            active_provider: ProviderType::Local,
            previous_path: PathBuf::from("/home/prompts.json"),
            migration: MigrationOutcome::Failed {
                error: "disk full".to_string(),
            },
        };

        let out = format_configure_outcome(&outcome);
        assert!(out.starts_with("⚠️ Storage configured but migration failed"));
        assert!(out.contains("**Active provider:** local"));
        assert!(out.contains("disk full"));
    }

    #[test]
    fn test_full_list_empty() {
        assert_eq!(format_prompt_list_full(&[]), NO_MATCHES);
    }
}
