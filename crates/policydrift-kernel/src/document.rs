//! Raw policy documents as handed over by the fetch and file-load collaborators.
//!
//! A document is identity (`id`, `name`), provenance (`source`) and an
//! unvalidated JSON body. Validation into a [`PolicyTree`](crate::tree::PolicyTree)
//! is deferred to the diffing phase so that one malformed document is
//! recorded against its own comparison instead of aborting the run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One policy document, either live or reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    /// Opaque identifier. May be empty for anonymized baselines.
    pub id: String,

    /// Stable display name.
    pub name: String,

    /// File the document was loaded from (reference side).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// The policy body, exactly as fetched or loaded.
    pub body: Value,
}

impl PolicyDocument {
    pub fn new(id: impl Into<String>, name: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: None,
            body,
        }
    }

    /// Tag the document with the file it was loaded from.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Name plus source file, for error messages.
    pub fn label(&self) -> String {
        match &self.source {
            Some(source) => format!("{} ({source})", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for PolicyDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn label_includes_source_when_present() {
        let doc = PolicyDocument::new("p-1", "MFA Policy", json!({}));
        assert_eq!(doc.label(), "MFA Policy");

        let doc = doc.with_source("mfa.json");
        assert_eq!(doc.label(), "MFA Policy (mfa.json)");
    }
}
