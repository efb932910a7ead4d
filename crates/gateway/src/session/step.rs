//! The Step data model and its in-memory, dense-indexed store.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::browser::{BoundingBox, ElementDescriptor, NavigationTrigger};
use crate::crypto;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// The closed tagged union a Step's `action` field carries (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepAction {
    Navigate {
        from_url: Option<String>,
        to_url: String,
        trigger: NavigationTrigger,
    },
    Click {
        x: f64,
        y: f64,
        button: MouseButton,
        element: Option<ElementDescriptor>,
    },
    Type {
        element: Option<ElementDescriptor>,
        text: String,
        submitted: bool,
    },
    Scroll {
        x: f64,
        y: f64,
        delta_x: f64,
        delta_y: f64,
    },
    Keypress {
        key: String,
        modifiers: Vec<Modifier>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Meta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub index: usize,
    pub action: StepAction,
    pub caption: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    pub created_at_ms: u64,
}

impl Step {
    fn caption_for(action: &StepAction) -> String {
        match action {
            StepAction::Navigate { to_url, .. } => format!("Navigate to {to_url}"),
            StepAction::Click { element, .. } => match element.as_ref().and_then(|e| e.label.clone()) {
                Some(label) => format!("Click {label}"),
                None => "Click".to_owned(),
            },
            StepAction::Type { text, .. } => format!("Type \"{text}\""),
            StepAction::Scroll { .. } => "Scroll".to_owned(),
            StepAction::Keypress { key, .. } => format!("Press {key}"),
        }
    }
}

/// Default-constructible descriptor used when tests need a placeholder
/// bounding box; kept here rather than in `browser` since only Step
/// construction needs it outside real CDP probes.
pub fn empty_bounding_box() -> BoundingBox {
    BoundingBox::default()
}

/// Dense-indexed, capped, append/update/delete store of a session's steps.
pub struct StepStore {
    steps: RwLock<Vec<Step>>,
    max_steps: usize,
}

/// A step that overflowed the cap and was silently dropped, paired with the
/// new step that displaced it — the caller uses this to emit `step:deleted`
/// before `step:new`.
pub struct Overflowed {
    pub dropped_id: String,
}

impl StepStore {
    pub fn new(max_steps: usize) -> Self {
        Self { steps: RwLock::new(Vec::new()), max_steps }
    }

    /// Append a new step, assigning it the next dense index. If the store is
    /// at capacity the oldest step is dropped first and re-indexing applied.
    pub async fn append(
        &self,
        action: StepAction,
        screenshot_path: Option<String>,
        now_ms: u64,
    ) -> (Step, Option<Overflowed>) {
        let mut steps = self.steps.write().await;
        let mut overflow = None;
        if steps.len() >= self.max_steps && !steps.is_empty() {
            let dropped = steps.remove(0);
            reindex(&mut steps);
            overflow = Some(Overflowed { dropped_id: dropped.id });
        }
        let step = Step {
            id: crypto::uuid_v4(),
            index: steps.len(),
            caption: Step::caption_for(&action),
            action,
            screenshot_path,
            created_at_ms: now_ms,
        };
        steps.push(step.clone());
        (step, overflow)
    }

    pub async fn update_caption(&self, step_id: &str, caption: String) -> Option<Step> {
        let mut steps = self.steps.write().await;
        let step = steps.iter_mut().find(|s| s.id == step_id)?;
        step.caption = caption;
        Some(step.clone())
    }

    /// Delete a step, compacting the remaining indexes to stay dense.
    pub async fn delete(&self, step_id: &str) -> bool {
        let mut steps = self.steps.write().await;
        let before = steps.len();
        steps.retain(|s| s.id != step_id);
        let removed = steps.len() != before;
        if removed {
            reindex(&mut steps);
        }
        removed
    }

    pub async fn list(&self) -> Vec<Step> {
        self.steps.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.steps.read().await.len()
    }

    /// Replace the whole step list, e.g. after an archive import. Indexes
    /// are normalized to stay dense regardless of what the import supplied.
    pub async fn replace_all(&self, mut steps: Vec<Step>) {
        reindex(&mut steps);
        *self.steps.write().await = steps;
    }
}

fn reindex(steps: &mut [Step]) {
    for (i, step) in steps.iter_mut().enumerate() {
        step.index = i;
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
