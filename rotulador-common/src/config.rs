//! Project configuration loading and validation
//!
//! A project is described by a single YAML document: a free-form description,
//! the ordered list of annotation tasks (the pipeline stages) and the users
//! allowed to annotate.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::warn;

/// Parsed project file
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub meta: Meta,
    /// Tasks in pipeline order; a task's position is its stage index
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Users keyed by username
    #[serde(default)]
    pub auth: BTreeMap<String, AuthEntry>,
    /// Deprecated inline translations, superseded by the embedded catalogs
    #[serde(default)]
    pub i18n: Vec<I18nEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthEntry {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct I18nEntry {
    pub name: String,
    pub value: String,
}

/// One labeling question applied to every image
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    /// Dependency conditions: `dependency task id -> required value`
    #[serde(rename = "if", default)]
    pub conditions: BTreeMap<String, String>,
    #[serde(default)]
    pub classes: BTreeMap<String, ClassDef>,
}

/// Selectable answer for a task
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Task type; non-`class` types come with a built-in set of classes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Class,
    Boolean,
    Rotation,
}

impl TaskKind {
    /// Classes implied by the task type, if any
    pub fn builtin_classes(self) -> Option<BTreeMap<String, ClassDef>> {
        let pairs: &[(&str, &str, &str)] = match self {
            TaskKind::Class => return None,
            TaskKind::Boolean => &[("true", "Yes", ""), ("false", "No", "")],
            TaskKind::Rotation => &[
                ("ok", "OK", "Not rotated"),
                ("h_inv", "Invert X", "Invert in horizontal axis"),
                ("v_inv", "Invert Y", "Invert in vertical axis"),
                ("+90", "+90deg", "Rotate 90 degrees clockwise"),
                ("-90", "-90deg", "Rotate 90 degrees counterclockwise"),
                ("180", "180deg", "Rotate 180 degrees"),
            ],
        };

        Some(
            pairs
                .iter()
                .map(|(id, name, description)| {
                    (
                        id.to_string(),
                        ClassDef {
                            name: name.to_string(),
                            description: description.to_string(),
                            examples: Vec::new(),
                        },
                    )
                })
                .collect(),
        )
    }
}

impl Task {
    pub fn has_class(&self, class_id: &str) -> bool {
        self.classes.contains_key(class_id)
    }

    /// Class ids in display order
    pub fn sorted_class_ids(&self) -> Vec<&str> {
        // BTreeMap iteration is already ordered by key
        self.classes.keys().map(String::as_str).collect()
    }
}

impl ProjectConfig {
    /// Load and validate a project file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a project document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.normalize()
    }

    fn normalize(mut self) -> Result<Self> {
        let mut seen = HashSet::new();
        for task in &mut self.tasks {
            if !seen.insert(task.id.clone()) {
                return Err(Error::Config(format!(
                    "task with {} is defined twice",
                    task.id
                )));
            }
            if task.short_name.is_empty() {
                task.short_name = task.name.clone();
            }
            if task.classes.is_empty() {
                task.classes = task.kind.builtin_classes().ok_or_else(|| {
                    Error::Config(format!(
                        "task {} does not have any classes or a compatible type",
                        task.id
                    ))
                })?;
            }
        }

        for (position, task) in self.tasks.iter().enumerate() {
            for (dependency, required) in &task.conditions {
                let Some(dep_index) = self.stage_index(dependency) else {
                    return Err(Error::Config(format!(
                        "task {} depends on undefined task {}",
                        task.id, dependency
                    )));
                };
                let dep_task = &self.tasks[dep_index];
                if !dep_task.has_class(required) {
                    warn!(
                        "task {} requires {}={} but {} has no such class",
                        task.id, dependency, required, dependency
                    );
                }
                if dep_index >= position {
                    warn!(
                        "task {} depends on {} which is not an earlier stage",
                        task.id, dependency
                    );
                }
            }
        }

        if self.auth.is_empty() {
            return Err(Error::Config("no users specified".to_string()));
        }
        for (user, entry) in &self.auth {
            if entry.password.is_empty() {
                return Err(Error::Config(format!("user {} has a null password", user)));
            }
        }

        if !self.i18n.is_empty() {
            warn!("i18n section in the project file is deprecated and ignored; translations are built in");
        }

        Ok(self)
    }

    /// Stage index (position in the pipeline) of a task
    pub fn stage_index(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == task_id)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    /// Check a username/password pair against the `auth` section
    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.auth
            .get(username)
            .map(|entry| entry.password == password)
            .unwrap_or(false)
    }
}

/// Commented starter project written by `init` and by folder mode
pub const SAMPLE_CONFIG: &str = r#"# rotulador project file
# Describes what is being annotated, the annotation pipeline and who may annotate.

meta:
  description: |
    Sample annotation project.
    Edit this description to explain what you're annotating.

# Users allowed to annotate (HTTP basic authentication)
auth:
  admin:
    password: "changeme"
  annotator:
    password: "changeme"

# Tasks are asked in order; each one is a stage of the pipeline
tasks:
  # Plain classification task
  - id: quality
    name: "Image Quality Assessment"
    short_name: "Quality"
    classes:
      good:
        name: "Good Quality"
        description: "Image is clear and well-focused"
      bad:
        name: "Poor Quality"
        description: "Image is blurry, dark, or has issues"
      unclear:
        name: "Unclear"
        description: "Cannot determine quality"

  # Built-in type: yes/no classes are created automatically
  - id: contains_person
    name: "Does the image contain a person?"
    short_name: "Person"
    type: boolean

  # Conditional task: only asked for images answered "true" above
  - id: person_age
    name: "Estimate person's age group"
    short_name: "Age"
    if:
      contains_person: "true"
    classes:
      child:
        name: "Child (0-12)"
      teen:
        name: "Teenager (13-19)"
      adult:
        name: "Adult (20-64)"
      senior:
        name: "Senior (65+)"
"#;

/// Write [`SAMPLE_CONFIG`] to `path`, creating parent folders
pub fn write_sample_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, SAMPLE_CONFIG)?;
    Ok(())
}
