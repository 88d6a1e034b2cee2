// src/policy.rs

//! Tool allowlist.
//!
//! The set is fixed when the policy is built and never changes for the
//! lifetime of the process. Matching is case-insensitive and exact: `GIT`
//! matches `git`, `git-lfs` does not.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::errors::PolicyError;

#[derive(Debug, Clone)]
pub struct ToolPolicy {
    /// Lowercased tool names.
    allowed: Arc<BTreeSet<String>>,
    /// Names as configured, for error messages and startup logs.
    display: Arc<[String]>,
}

impl ToolPolicy {
    pub fn new<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let display: Vec<String> = tools
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let allowed = display.iter().map(|t| t.to_lowercase()).collect();

        Self {
            allowed: Arc::new(allowed),
            display: display.into(),
        }
    }

    pub fn is_allowed(&self, tool: &str) -> bool {
        self.allowed.contains(&tool.to_lowercase())
    }

    /// Same as [`is_allowed`](Self::is_allowed) but produces the error the
    /// execution layer raises.
    pub fn check(&self, tool: &str) -> Result<(), PolicyError> {
        if self.is_allowed(tool) {
            Ok(())
        } else {
            Err(PolicyError::ToolNotAllowed {
                tool: tool.to_string(),
                allowed: self.display.to_vec(),
            })
        }
    }

    pub fn allowed_tools(&self) -> &[String] {
        &self.display
    }
}
