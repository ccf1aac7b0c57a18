use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an AI prompt with metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    #[serde(default = "new_id")] // Records written by hand may lack an id
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String, // e.g., "development", "writing"
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")] // Files written by other tools may omit timestamps
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Prompt {
    pub fn new(new: NewPrompt) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: new.name,
            description: new.description,
            content: new.content,
            category: new.category,
            tags: new.tags,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the supplied fields and refreshes `updated_at`.
    pub fn apply(&mut self, update: PromptUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(content) = update.content {
            self.content = content;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(tags) = update.tags {
            self.tags = tags;
        }
        self.updated_at = Utc::now();
    }

    fn has_tag_ignore_case(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == tag)
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// On-disk layout of the prompts file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptsFile {
    #[serde(default)]
    pub prompts: Vec<Prompt>,
}

/// Fields required to create a prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPrompt {
    pub name: String,
    pub description: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Filters applied by the list operation. All matching is case-insensitive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptFilter {
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub search: Option<String>,
}

impl PromptFilter {
    pub fn matches(&self, prompt: &Prompt) -> bool {
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            if prompt.category.to_lowercase() != category.to_lowercase() {
                return false;
            }
        }

        if let Some(tags) = self.tags.as_ref().filter(|t| !t.is_empty()) {
            if !tags.iter().any(|tag| prompt.has_tag_ignore_case(tag)) {
                return false;
            }
        }

        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            if !prompt.name.to_lowercase().contains(&needle)
                && !prompt.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }

        true
    }
}
