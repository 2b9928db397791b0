//! Skill package model and SKILL.md parsing.

use std::collections::HashMap;
use std::path::PathBuf;

use gray_matter::engine::YAML;
use gray_matter::Matter;

use crate::SkillError;

/// Parsed SKILL.md frontmatter.
#[derive(Debug, Clone, Default)]
pub struct SkillMeta {
    pub name: String,
    pub description: String,
    /// Optional model override for this skill's completions.
    pub model: Option<String>,
    /// Tool names this skill is allowed to use; empty means all.
    pub allowed_tools: Vec<String>,
}

/// On-disk resources shipped with a skill.
#[derive(Debug, Clone, Default)]
pub struct SkillResources {
    pub scripts: Vec<PathBuf>,
    pub references: Vec<PathBuf>,
    pub assets: Vec<PathBuf>,
}

/// A loadable skill: metadata, markdown body, root path and resources.
#[derive(Debug, Clone)]
pub struct SkillPackage {
    pub meta: SkillMeta,
    pub body: String,
    pub path: PathBuf,
    pub resources: SkillResources,
}

/// Parse SKILL.md content into metadata + markdown body.
pub fn parse_skill_file(content: &str) -> Result<(SkillMeta, String), SkillError> {
    let matter = Matter::<YAML>::new();
    let parsed = matter.parse(content);

    let data = parsed
        .data
        .ok_or_else(|| SkillError::Parse("no frontmatter found".into()))?;
    let hash = data
        .as_hashmap()
        .map_err(|_| SkillError::Parse("frontmatter is not a mapping".into()))?;

    let name =
        get_string(&hash, "name").ok_or_else(|| SkillError::MissingField("name".into()))?;
    let description = get_string(&hash, "description")
        .ok_or_else(|| SkillError::MissingField("description".into()))?;
    let model = get_string(&hash, "model");
    let allowed_tools = get_string_vec(&hash, "allowed-tools");

    Ok((
        SkillMeta {
            name,
            description,
            model,
            allowed_tools,
        },
        parsed.content,
    ))
}

fn get_string(map: &HashMap<String, gray_matter::Pod>, key: &str) -> Option<String> {
    map.get(key).and_then(|v| v.as_string().ok())
}

fn get_string_vec(map: &HashMap<String, gray_matter::Pod>, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(|v| v.as_vec().ok())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| item.as_string().ok())
                .collect()
        })
        .unwrap_or_default()
}
