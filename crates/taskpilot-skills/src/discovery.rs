//! Skill discovery: walk a root directory and load every package.
//!
//! Layout per package: `<root>/<dir>/SKILL.md` with YAML frontmatter,
//! plus optional `scripts/`, `references/` and `assets/` directories.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::package::{parse_skill_file, SkillPackage, SkillResources};
use crate::SkillError;

/// Enumerate skill packages under `root`, keyed by skill name.
///
/// Packages that fail to parse are skipped with a warning; a name
/// collision across packages fails discovery outright.
pub fn discover_skills(root: &Path) -> Result<HashMap<String, SkillPackage>, SkillError> {
    let mut skills = HashMap::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let manifest = dir.join("SKILL.md");
        if !manifest.is_file() {
            continue;
        }

        let content = fs::read_to_string(&manifest)?;
        let (meta, body) = match parse_skill_file(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(path = %manifest.display(), error = %e, "skipping invalid skill");
                continue;
            }
        };

        let package = SkillPackage {
            resources: scan_resources(&dir)?,
            path: dir,
            body,
            meta,
        };

        let name = package.meta.name.clone();
        debug!(skill = %name, path = %package.path.display(), "discovered skill");
        if skills.insert(name.clone(), package).is_some() {
            return Err(SkillError::DuplicateName(name));
        }
    }

    Ok(skills)
}

fn scan_resources(dir: &Path) -> Result<SkillResources, SkillError> {
    Ok(SkillResources {
        scripts: list_files(&dir.join("scripts"))?,
        references: list_files(&dir.join("references"))?,
        assets: list_files(&dir.join("assets"))?,
    })
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, SkillError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}
