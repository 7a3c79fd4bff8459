//! Locates workflow template files on disk.
//!
//! Candidates are tried in a fixed order and the first one that exists
//! wins:
//!
//! 1. the explicit path: absolute as given, otherwise resolved against the
//!    install root and then against the working directory;
//! 2. the logical name: `<template_dir>/<name>.json`, then
//!    `<install_root>/<name>.json`.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::job::WorkflowRef;
use crate::workflow::WorkflowError;

/// Extension appended to logical workflow names.
const TEMPLATE_EXTENSION: &str = "json";

/// Filesystem roots used to resolve workflow references.
#[derive(Debug, Clone)]
pub struct WorkflowResolver {
    install_root: PathBuf,
    working_dir: PathBuf,
    template_dir: PathBuf,
}

/// Outcome of [`WorkflowResolver::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowValidation {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResolver {
    /// * `install_root` - the service's install directory.
    /// * `working_dir`  - the process working directory.
    /// * `template_dir` - configured template directory; relative values are
    ///   taken relative to `install_root`.
    pub fn new(install_root: PathBuf, working_dir: PathBuf, template_dir: PathBuf) -> Self {
        let template_dir = if template_dir.is_absolute() {
            template_dir
        } else {
            install_root.join(template_dir)
        };
        Self {
            install_root,
            working_dir,
            template_dir,
        }
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    /// Ordered candidate list for a reference. Empty when the reference is empty.
    pub fn candidates(&self, workflow: &WorkflowRef) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(path) = workflow.path.as_deref() {
            let path = Path::new(path);
            if path.is_absolute() {
                candidates.push(path.to_path_buf());
            } else {
                candidates.push(self.install_root.join(path));
                candidates.push(self.working_dir.join(path));
            }
        }

        if let Some(name) = workflow.name.as_deref() {
            let file_name = format!("{name}.{TEMPLATE_EXTENSION}");
            candidates.push(self.template_dir.join(&file_name));
            candidates.push(self.install_root.join(&file_name));
        }

        candidates
    }

    /// Return the first candidate that exists as a file.
    pub fn resolve(&self, workflow: &WorkflowRef) -> Result<PathBuf, WorkflowError> {
        if workflow.is_empty() {
            return Err(WorkflowError::MissingReference);
        }

        let candidates = self.candidates(workflow);
        tracing::debug!(
            name = ?workflow.name,
            path = ?workflow.path,
            candidates = ?candidates,
            "Resolving workflow template",
        );

        match candidates.iter().find(|p| p.is_file()) {
            Some(found) => Ok(found.clone()),
            None => Err(WorkflowError::NotFound {
                reference: workflow.label().to_string(),
                candidates,
            }),
        }
    }

    /// Report whether a reference resolves, without reading the document.
    pub fn validate(&self, workflow: &WorkflowRef) -> WorkflowValidation {
        match self.resolve(workflow) {
            Ok(found) => WorkflowValidation {
                exists: true,
                name: workflow.name.clone().or_else(|| file_stem(&found)),
                path: Some(found.display().to_string()),
                error: None,
            },
            Err(WorkflowError::NotFound { .. }) => WorkflowValidation {
                exists: false,
                name: workflow.name.clone(),
                path: workflow.path.clone().or_else(|| {
                    workflow.name.as_deref().map(|name| {
                        self.template_dir
                            .join(format!("{name}.{TEMPLATE_EXTENSION}"))
                            .display()
                            .to_string()
                    })
                }),
                error: None,
            },
            Err(e) => WorkflowValidation {
                exists: false,
                name: workflow.name.clone(),
                path: workflow.path.clone(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// File name without its extension, used as a fallback workflow name.
pub fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}
