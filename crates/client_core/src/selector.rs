//! Three-level dependent selection (level-2 scene → level-3 scene → number)
//! used to compose a query-type code.

use shared::protocol::{QueryTypeDraft, Scene};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("{level} cannot be chosen before {parent}")]
    ParentUnset {
        level: &'static str,
        parent: &'static str,
    },
    #[error("'{value}' is not a known {level} option")]
    UnknownOption { level: &'static str, value: String },
    #[error("number must be at least 1")]
    InvalidNumber,
    #[error("selection is incomplete")]
    Incomplete,
}

/// Scene options as served by the backend, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneCatalog {
    scenes: Vec<Scene>,
}

impl SceneCatalog {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn level2_options(&self) -> Vec<&str> {
        self.scenes.iter().map(|scene| scene.level2.as_str()).collect()
    }

    pub fn level3_options(&self, level2: &str) -> &[String] {
        self.scenes
            .iter()
            .find(|scene| scene.level2 == level2)
            .map(|scene| scene.level3.as_slice())
            .unwrap_or_default()
    }

    fn has_level2(&self, level2: &str) -> bool {
        self.scenes.iter().any(|scene| scene.level2 == level2)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub level2: Option<String>,
    pub level3: Option<String>,
    pub number: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct CascadingSelector {
    catalog: SceneCatalog,
    selection: Selection,
}

impl CascadingSelector {
    pub fn new(catalog: SceneCatalog) -> Self {
        Self {
            catalog,
            selection: Selection::default(),
        }
    }

    pub fn catalog(&self) -> &SceneCatalog {
        &self.catalog
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Stores the level-2 scene and clears everything below it. A blank
    /// value clears the whole selection.
    pub fn set_level2(&mut self, value: &str) -> Result<(), SelectionError> {
        let value = value.trim();
        if value.is_empty() {
            self.reset();
            return Ok(());
        }
        if !self.catalog.has_level2(value) {
            return Err(SelectionError::UnknownOption {
                level: "level2",
                value: value.to_string(),
            });
        }
        self.selection = Selection {
            level2: Some(value.to_string()),
            level3: None,
            number: None,
        };
        Ok(())
    }

    pub fn set_level3(&mut self, value: &str) -> Result<(), SelectionError> {
        let Some(level2) = self.selection.level2.as_deref() else {
            return Err(SelectionError::ParentUnset {
                level: "level3",
                parent: "level2",
            });
        };
        let value = value.trim();
        if value.is_empty() {
            self.selection.level3 = None;
            self.selection.number = None;
            return Ok(());
        }
        if !self
            .catalog
            .level3_options(level2)
            .iter()
            .any(|option| option == value)
        {
            return Err(SelectionError::UnknownOption {
                level: "level3",
                value: value.to_string(),
            });
        }
        self.selection.level3 = Some(value.to_string());
        self.selection.number = None;
        Ok(())
    }

    pub fn set_number(&mut self, number: u32) -> Result<(), SelectionError> {
        if self.selection.level3.is_none() {
            return Err(SelectionError::ParentUnset {
                level: "number",
                parent: "level3",
            });
        }
        if number == 0 {
            return Err(SelectionError::InvalidNumber);
        }
        self.selection.number = Some(number);
        Ok(())
    }

    pub fn is_level3_enabled(&self) -> bool {
        self.selection.level2.is_some()
    }

    pub fn is_number_enabled(&self) -> bool {
        self.selection.level3.is_some()
    }

    pub fn reset(&mut self) {
        self.selection = Selection::default();
    }

    pub fn is_complete(&self) -> bool {
        self.parts().is_some()
    }

    /// `level2-level3-number`, only once all three are chosen.
    pub fn code(&self) -> Option<String> {
        self.parts()
            .map(|(level2, level3, number)| format!("{level2}-{level3}-{number}"))
    }

    pub fn label(&self) -> Option<String> {
        self.parts()
            .map(|(level2, level3, number)| format!("{level2} / {level3} / {number}"))
    }

    pub fn to_draft(
        &self,
        name: &str,
        generation_prompt: &str,
        analysis_prompt: &str,
        scoring_prompt: Option<&str>,
    ) -> Result<QueryTypeDraft, SelectionError> {
        let (level2, level3, number) = self.parts().ok_or(SelectionError::Incomplete)?;
        Ok(QueryTypeDraft {
            code: format!("{level2}-{level3}-{number}"),
            name: name.to_string(),
            level2_scene: level2.to_string(),
            level3_scene: level3.to_string(),
            number,
            generation_prompt: generation_prompt.to_string(),
            analysis_prompt: analysis_prompt.to_string(),
            scoring_prompt: scoring_prompt.map(str::to_string),
        })
    }

    fn parts(&self) -> Option<(&str, &str, u32)> {
        Some((
            self.selection.level2.as_deref()?,
            self.selection.level3.as_deref()?,
            self.selection.number?,
        ))
    }
}

#[cfg(test)]
#[path = "tests/selector_tests.rs"]
mod tests;
