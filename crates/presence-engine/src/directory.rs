//! Employee directory interface — the external persistence collaborator
//! that owns employee records and stored face templates.
//!
//! The core reads templates during verification and writes exactly one
//! template per completed enrollment session. Schema and durability are the
//! collaborator's concern; an in-memory implementation is provided for
//! tests and single-node deployments.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use presence_core::types::FaceTemplate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("no face template stored for employee {employee_id}")]
    TemplateNotFound { employee_id: String },
    #[error("directory storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// Fetch the stored template for an employee.
    async fn get_template(&self, employee_id: &str) -> Result<FaceTemplate, DirectoryError>;

    /// Store (or replace) the template for the employee named in it.
    async fn save_template(&self, template: FaceTemplate) -> Result<(), DirectoryError>;

    /// Employees known to the directory that have no template yet —
    /// the enrollment backlog.
    async fn employees_without_template(&self) -> Result<Vec<String>, DirectoryError>;
}

/// In-memory directory backed by a `HashMap`, guarded by a single mutex
/// (short critical sections, no await while held).
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    inner: Mutex<DirectoryState>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    roster: BTreeSet<String>,
    templates: HashMap<String, FaceTemplate>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an employee on the roster without a template.
    pub fn add_employee(&self, employee_id: &str) {
        let mut state = self.inner.lock().expect("directory mutex poisoned");
        state.roster.insert(employee_id.to_string());
    }
}

#[async_trait]
impl EmployeeDirectory for MemoryDirectory {
    async fn get_template(&self, employee_id: &str) -> Result<FaceTemplate, DirectoryError> {
        let state = self.inner.lock().expect("directory mutex poisoned");
        state
            .templates
            .get(employee_id)
            .cloned()
            .ok_or_else(|| DirectoryError::TemplateNotFound {
                employee_id: employee_id.to_string(),
            })
    }

    async fn save_template(&self, template: FaceTemplate) -> Result<(), DirectoryError> {
        let mut state = self.inner.lock().expect("directory mutex poisoned");
        state.roster.insert(template.employee_id.clone());
        state.templates.insert(template.employee_id.clone(), template);
        Ok(())
    }

    async fn employees_without_template(&self) -> Result<Vec<String>, DirectoryError> {
        let state = self.inner.lock().expect("directory mutex poisoned");
        Ok(state
            .roster
            .iter()
            .filter(|id| !state.templates.contains_key(*id))
            .cloned()
            .collect())
    }
}
