//! Milestone discovery and parsing.
//!
//! Milestone specifications live in the milestones directory as
//! `M<n>_<slug>.md`. The current milestone is the highest-numbered one.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static FILE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[Mm](\d+)_(.+)\.md$").expect("static regex"));

static PHASE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#{2,6}\s*|[-*+]\s*(?:\[([ xX])\]\s*)?|\d+\.\s*)?(?:\*\*)?phase\s+(\d+)(?:\*\*)?\s*[:.)\-–—]?\s*(.*)$",
    )
    .expect("static regex")
});

static NUMBERED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)[.)]\s+(.+)$").expect("static regex"));

static CHECKBOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[ xX]\]\s*").expect("static regex"));

/// A milestone file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneFile {
    /// Normalized identifier, e.g. `M5`
    pub id: String,
    pub number: u32,
    pub path: PathBuf,
}

impl MilestoneFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.id.clone())
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// One phase of a milestone definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDef {
    pub number: u32,
    pub title: String,
    /// Checked off in the document itself (`- [x] Phase 2 ...`)
    pub checked: bool,
}

/// Parsed milestone specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Milestone {
    pub id: String,
    pub title: String,
    pub objective: String,
    /// Raw text of the Phases section
    pub phases_text: String,
    pub phases: Vec<PhaseDef>,
    pub success_criteria: Vec<String>,
}

impl Milestone {
    pub fn load(file: &MilestoneFile) -> Result<Self> {
        let content = std::fs::read_to_string(&file.path)
            .with_context(|| format!("Failed to read milestone {}", file.path.display()))?;
        Ok(Self::parse(&file.id, &content))
    }

    pub fn parse(id: &str, content: &str) -> Self {
        let title = content
            .lines()
            .find_map(|l| l.strip_prefix("# "))
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| id.to_string());

        let objective = section(content, "Objective").unwrap_or_default();
        let phases_section = section(content, "Phases");
        let phases = parse_phases(phases_section.as_deref().unwrap_or(content), phases_section.is_some());
        let success_criteria = section(content, "Success Criteria")
            .map(|s| bullet_items(&s))
            .unwrap_or_default();

        Self {
            id: id.to_string(),
            title,
            objective,
            phases_text: phases_section.unwrap_or_default(),
            phases,
            success_criteria,
        }
    }

    pub fn phase(&self, number: u32) -> Option<&PhaseDef> {
        self.phases.iter().find(|p| p.number == number)
    }

    pub fn phase_numbers(&self) -> Vec<u32> {
        self.phases.iter().map(|p| p.number).collect()
    }
}

/// Normalize a milestone reference (`M5`, `m5`, `5`, `M5_Auth`) to `M5`.
pub fn normalize_id(reference: &str) -> Option<String> {
    let trimmed = reference.trim();
    let without_prefix = trimmed
        .strip_prefix('M')
        .or_else(|| trimmed.strip_prefix('m'))
        .unwrap_or(trimmed);
    let digits: String = without_prefix
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let rest = &without_prefix[digits.len()..];
    if digits.is_empty() || !(rest.is_empty() || rest.starts_with('_') || rest.ends_with(".md")) {
        return None;
    }
    let number: u32 = digits.parse().ok()?;
    Some(format!("M{}", number))
}

/// All milestone files in `dir`, sorted by number.
pub fn list_milestones(dir: &Path) -> Result<Vec<MilestoneFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let pattern = dir.join("*.md").to_string_lossy().to_string();
    let mut files: Vec<MilestoneFile> = glob::glob(&pattern)
        .context("Failed to read glob pattern")?
        .filter_map(|entry| entry.ok())
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().to_string();
            let caps = FILE_NAME_RE.captures(&name)?;
            let number: u32 = caps.get(1)?.as_str().parse().ok()?;
            Some(MilestoneFile {
                id: format!("M{}", number),
                number,
                path,
            })
        })
        .collect();

    files.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}

/// The highest-numbered milestone.
pub fn find_current_milestone(dir: &Path) -> Result<Option<MilestoneFile>> {
    Ok(list_milestones(dir)?.pop())
}

/// Look up a milestone by reference (see [`normalize_id`]).
pub fn find_milestone(dir: &Path, reference: &str) -> Result<Option<MilestoneFile>> {
    let Some(id) = normalize_id(reference) else {
        return Ok(None);
    };
    Ok(list_milestones(dir)?.into_iter().find(|m| m.id == id))
}

/// The milestone after the current one, falling back to the current one when
/// the next has not been written yet.
pub fn next_milestone(dir: &Path) -> Result<Option<MilestoneFile>> {
    let files = list_milestones(dir)?;
    let Some(current) = files.last() else {
        return Ok(None);
    };
    let next_number = current.number + 1;
    Ok(files
        .iter()
        .find(|m| m.number == next_number)
        .or(Some(current))
        .cloned())
}

/// Body of the level-2 section named `name`, up to the next level-1/2 heading.
pub fn section(content: &str, name: &str) -> Option<String> {
    let mut lines = content.lines();
    let wanted = name.to_lowercase();

    lines.find(|line| {
        line.strip_prefix("##")
            .filter(|rest| !rest.starts_with('#'))
            .map(|rest| heading_text(rest).to_lowercase() == wanted)
            .unwrap_or(false)
    })?;

    let body: Vec<&str> = lines
        .take_while(|line| !(line.starts_with("# ") || (line.starts_with("##") && !line.starts_with("###"))))
        .collect();
    Some(body.join("\n").trim().to_string())
}

/// Heading text without numbering, e.g. `" 2. Core Principles"` → `"Core Principles"`.
fn heading_text(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_number = trimmed.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
    without_number.trim()
}

fn parse_phases(text: &str, in_phases_section: bool) -> Vec<PhaseDef> {
    let mut phases: Vec<PhaseDef> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = PHASE_LINE_RE.captures(line) {
            let Some(number) = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                continue;
            };
            if phases.iter().any(|p| p.number == number) {
                continue;
            }
            let checked = caps
                .get(1)
                .map(|m| m.as_str().eq_ignore_ascii_case("x"))
                .unwrap_or(false);
            let title = caps
                .get(3)
                .map(|m| m.as_str().trim().trim_matches('*').trim().to_string())
                .unwrap_or_default();
            phases.push(PhaseDef {
                number,
                title,
                checked,
            });
        }
    }

    if phases.is_empty() && in_phases_section {
        for line in text.lines() {
            if let Some(caps) = NUMBERED_ITEM_RE.captures(line)
                && let Ok(number) = caps[1].parse::<u32>()
                && !phases.iter().any(|p| p.number == number)
            {
                phases.push(PhaseDef {
                    number,
                    title: caps[2].trim().to_string(),
                    checked: false,
                });
            }
        }
    }

    phases.sort_by_key(|p| p.number);
    phases
}

fn bullet_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let item = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .or_else(|| trimmed.strip_prefix("+ "))?;
            let item = CHECKBOX_RE.replace(item, "");
            let item = item.trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect()
}
