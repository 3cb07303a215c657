//! Skill-artifact promotion (spec §4.9): once a procedure crosses the
//! reinforcement threshold, its recipe is rendered as a markdown-frontmatter
//! skill file and handed to an external collaborator to persist. The
//! frontmatter shape mirrors the `SKILL.md` format this workspace also reads
//! elsewhere, inverted here into a writer instead of a parser.

use std::fs;
use std::path::PathBuf;

use memnexus_core::Procedure;
use serde::Serialize;

/// External collaborator that persists a promoted procedure as a skill
/// artifact outside the Fact Store (spec §6: promotion "writes a skill
/// artifact via an external collaborator").
pub trait SkillArtifactWriter: Send + Sync {
    /// Writes `procedure` as a skill artifact, returning the path (or other
    /// locator) it was written to.
    fn write(&self, procedure: &Procedure) -> Result<String, String>;
}

fn slugify(task_pattern: &str) -> String {
    let mut slug = String::with_capacity(task_pattern.len());
    let mut last_was_dash = false;
    for ch in task_pattern.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "procedure".into()
    } else {
        slug
    }
}

/// Mirrors the `SkillFrontmatter` shape this workspace parses elsewhere,
/// serialized here instead of deserialized.
#[derive(Debug, Serialize)]
struct PromotedFrontmatter {
    name: String,
    description: String,
    triggers: Vec<String>,
    tools: Vec<String>,
}

/// Renders a procedure's recipe as `SKILL.md`-shaped markdown: YAML
/// frontmatter (`name`, `description`, `triggers`, `tools`) followed by a
/// numbered instructions body built from the recipe steps.
#[must_use]
pub fn render_skill_markdown(procedure: &Procedure) -> String {
    let name = slugify(&procedure.task_pattern);
    let tools: Vec<String> = {
        let mut seen = Vec::new();
        for step in &procedure.recipe {
            if !seen.contains(&step.tool) {
                seen.push(step.tool.clone());
            }
        }
        seen
    };

    let frontmatter = PromotedFrontmatter {
        name,
        description: procedure.task_pattern.clone(),
        triggers: vec![procedure.task_pattern.clone()],
        tools,
    };
    let yaml = serde_yaml::to_string(&frontmatter).unwrap_or_default();

    let mut body = String::new();
    body.push_str("---\n");
    body.push_str(&yaml);
    body.push_str("---\n\n");
    body.push_str(&format!("# {}\n\n", procedure.task_pattern));
    for (idx, step) in procedure.recipe.iter().enumerate() {
        body.push_str(&format!("{}. **{}** — {}\n", idx + 1, step.tool, step.summary));
        if !step.args.is_null() {
            body.push_str(&format!("   args: `{}`\n", step.args));
        }
    }
    body
}

/// Filesystem-backed [`SkillArtifactWriter`]: writes `<root>/<slug>.md`,
/// creating `root` if it does not exist.
#[derive(Debug, Clone)]
pub struct FsSkillWriter {
    root: PathBuf,
}

impl FsSkillWriter {
    /// Builds a writer rooted at `root` (spec `procedures.skillsAutoPath`).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SkillArtifactWriter for FsSkillWriter {
    fn write(&self, procedure: &Procedure) -> Result<String, String> {
        fs::create_dir_all(&self.root).map_err(|e| e.to_string())?;
        let name = slugify(&procedure.task_pattern);
        let path = self.root.join(format!("{name}.md"));
        fs::write(&path, render_skill_markdown(procedure)).map_err(|e| e.to_string())?;
        Ok(path.to_string_lossy().into_owned())
    }
}
