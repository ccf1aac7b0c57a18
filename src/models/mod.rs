pub mod prompt;

pub use prompt::{NewPrompt, Prompt, PromptFilter, PromptUpdate, PromptsFile};
