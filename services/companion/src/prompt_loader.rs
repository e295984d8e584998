use anyhow::{Context, Result};
use companion_core::chat::{DEFAULT_PERSONA, persona_prompt};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const PERSONA_KEY: &str = "persona";

pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem for prompt file")?
                .to_string();

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

            prompts.insert(prompt_key, content);
        }
    }

    Ok(prompts)
}

/// The persona system prompt with `{expressions}` filled in. Falls back to
/// the built-in persona when the directory or the `persona.md` file is
/// missing.
pub fn load_persona(dir_path: &Path) -> String {
    let template = match load_prompts(dir_path) {
        Ok(mut prompts) => prompts.remove(PERSONA_KEY),
        Err(e) => {
            tracing::warn!("No prompts loaded ({:#}); using the built-in persona", e);
            None
        }
    };
    persona_prompt(template.as_deref().unwrap_or(DEFAULT_PERSONA))
}
