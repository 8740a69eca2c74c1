//! Next-image selection and progress statistics
//!
//! Everything here works on a [`Snapshot`] of the database taken once per
//! request: the image list plus, for every image and stage, the set of
//! values any user answered. Dependency conditions and availability are
//! evaluated against that snapshot.
//!
//! An image is *eligible* for a task when, for every `if` condition of the
//! task, at least one annotation of the image at the dependency's stage has
//! the required value. It is *available* when it is eligible and nobody has
//! annotated it at the task's own stage yet.

use crate::config::{ProjectConfig, Task};
use crate::db::{AnnotationRepository, Image, ImageRepository, StageValue};
use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};

/// Number of leading available images the next step is drawn from
///
/// Drawing from a small window keeps concurrent annotators on different
/// images while still finishing the list front to back.
pub const CANDIDATE_WINDOW: usize = 10;

/// Point-in-time view of images and their recorded answers
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    images: Vec<Image>,
    /// image sha256 -> stage index -> values answered by any user
    values: HashMap<String, HashMap<usize, HashSet<String>>>,
}

impl Snapshot {
    pub fn new(images: Vec<Image>, stage_values: Vec<StageValue>) -> Self {
        let mut values: HashMap<String, HashMap<usize, HashSet<String>>> = HashMap::new();
        for row in stage_values {
            if row.stage_index < 0 {
                continue;
            }
            values
                .entry(row.image_sha256)
                .or_default()
                .entry(row.stage_index as usize)
                .or_default()
                .insert(row.option_value);
        }
        Self { images, values }
    }

    /// Read images and answers from the database
    pub async fn load(images: &ImageRepository, annotations: &AnnotationRepository) -> Result<Self> {
        let image_list = images.list().await?;
        let stage_values = annotations.stage_values().await?;
        Ok(Self::new(image_list, stage_values))
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn image(&self, sha256: &str) -> Option<&Image> {
        self.images.iter().find(|image| image.sha256 == sha256)
    }

    /// Whether any user answered `stage` for the image
    pub fn is_annotated(&self, sha256: &str, stage: usize) -> bool {
        self.stage_set(sha256, stage)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    /// Whether any user answered `value` at `stage` for the image
    pub fn has_value(&self, sha256: &str, stage: usize, value: &str) -> bool {
        self.stage_set(sha256, stage)
            .map(|set| set.contains(value))
            .unwrap_or(false)
    }

    fn stage_set(&self, sha256: &str, stage: usize) -> Option<&HashSet<String>> {
        self.values.get(sha256).and_then(|stages| stages.get(&stage))
    }
}

/// Next image to present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationStep {
    pub task_id: String,
    pub image_sha256: String,
    pub filename: String,
}

/// Where every image of the dataset stands for one task
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseProgress {
    /// Eligible and annotated
    pub completed: usize,
    /// Eligible and not yet annotated
    pub pending: usize,
    /// Annotated at a dependency stage, but not with the required value
    pub filtered_wrong_class: usize,
    /// Dependency stages not answered yet
    pub not_yet_annotated: usize,
    pub total: usize,
    pub completed_percent: f64,
    pub pending_percent: f64,
    pub filtered_percent: f64,
    pub not_yet_annotated_percent: f64,
}

/// Counts shown for a task in the help timeline
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgress {
    pub task_id: String,
    pub available: usize,
    pub eligible: usize,
    pub completed: usize,
    pub phase: PhaseProgress,
}

/// Dependency evaluation over a project's tasks and a snapshot
#[derive(Clone, Copy)]
pub struct Pipeline<'a> {
    config: &'a ProjectConfig,
    snapshot: &'a Snapshot,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a ProjectConfig, snapshot: &'a Snapshot) -> Self {
        Self { config, snapshot }
    }

    fn resolve(&self, task_id: &str) -> Result<(usize, &'a Task)> {
        let stage = self
            .config
            .stage_index(task_id)
            .ok_or_else(|| Error::NotFound(format!("task not found: {}", task_id)))?;
        Ok((stage, &self.config.tasks[stage]))
    }

    /// Stage indexes of a task's dependencies with the required values
    fn dependencies(&self, task: &'a Task) -> impl Iterator<Item = (usize, &'a str)> + 'a {
        let config = self.config;
        task.conditions.iter().filter_map(move |(dep_id, required)| {
            // Validated at load time; an unknown dependency imposes nothing
            config
                .stage_index(dep_id)
                .map(|stage| (stage, required.as_str()))
        })
    }

    pub fn is_eligible(&self, task: &'a Task, sha256: &str) -> bool {
        self.dependencies(task)
            .all(|(stage, required)| self.snapshot.has_value(sha256, stage, required))
    }

    fn is_available(&self, stage: usize, task: &'a Task, sha256: &str) -> bool {
        !self.snapshot.is_annotated(sha256, stage) && self.is_eligible(task, sha256)
    }

    /// Images satisfying all of the task's conditions, annotated or not
    pub fn count_eligible(&self, task_id: &str) -> Result<usize> {
        let (_, task) = self.resolve(task_id)?;
        Ok(self
            .snapshot
            .images()
            .iter()
            .filter(|image| self.is_eligible(task, &image.sha256))
            .count())
    }

    /// Eligible images nobody has annotated for the task yet
    pub fn count_available(&self, task_id: &str) -> Result<usize> {
        let (stage, task) = self.resolve(task_id)?;
        Ok(self
            .snapshot
            .images()
            .iter()
            .filter(|image| self.is_available(stage, task, &image.sha256))
            .count())
    }

    pub fn phase_progress(&self, task_id: &str) -> Result<PhaseProgress> {
        let (stage, task) = self.resolve(task_id)?;
        let dependency_stages: Vec<usize> = self.dependencies(task).map(|(s, _)| s).collect();

        let mut progress = PhaseProgress {
            total: self.snapshot.images().len(),
            ..PhaseProgress::default()
        };

        for image in self.snapshot.images() {
            let sha256 = image.sha256.as_str();
            if self.is_eligible(task, sha256) {
                if self.snapshot.is_annotated(sha256, stage) {
                    progress.completed += 1;
                } else {
                    progress.pending += 1;
                }
            } else if dependency_stages
                .iter()
                .any(|&dep| self.snapshot.is_annotated(sha256, dep))
            {
                progress.filtered_wrong_class += 1;
            } else {
                progress.not_yet_annotated += 1;
            }
        }

        if progress.total > 0 {
            let total = progress.total as f64;
            progress.completed_percent = progress.completed as f64 / total * 100.0;
            progress.pending_percent = progress.pending as f64 / total * 100.0;
            progress.filtered_percent = progress.filtered_wrong_class as f64 / total * 100.0;
            progress.not_yet_annotated_percent = progress.not_yet_annotated as f64 / total * 100.0;
        }

        Ok(progress)
    }

    pub fn task_progress(&self, task_id: &str) -> Result<TaskProgress> {
        let phase = self.phase_progress(task_id)?;
        Ok(TaskProgress {
            task_id: task_id.to_string(),
            available: phase.pending,
            eligible: phase.completed + phase.pending,
            completed: phase.completed,
            phase,
        })
    }

    /// Progress of every task, in pipeline order
    pub fn all_task_progress(&self) -> Result<Vec<TaskProgress>> {
        self.config
            .tasks
            .iter()
            .map(|task| self.task_progress(&task.id))
            .collect()
    }

    /// Pick the next image to annotate
    ///
    /// With a task id, only that task is considered; an unknown id is an
    /// error. Without one, tasks are tried in pipeline order. `None` means
    /// nothing is left to annotate.
    pub fn next_step<R: Rng + ?Sized>(
        &self,
        task_id: Option<&str>,
        rng: &mut R,
    ) -> Result<Option<AnnotationStep>> {
        let Some(task_id) = task_id else {
            for task in &self.config.tasks {
                if let Some(step) = self.next_step(Some(&task.id), rng)? {
                    return Ok(Some(step));
                }
            }
            return Ok(None);
        };

        let (stage, task) = self.resolve(task_id)?;
        let candidates: Vec<&Image> = self
            .snapshot
            .images()
            .iter()
            .filter(|image| self.is_available(stage, task, &image.sha256))
            .take(CANDIDATE_WINDOW)
            .collect();

        Ok(candidates.choose(rng).map(|image| AnnotationStep {
            task_id: task.id.clone(),
            image_sha256: image.sha256.clone(),
            filename: image.filename.clone(),
        }))
    }
}
