use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Content-derived element fingerprint that survives reloads. Not unique: two
/// identical buttons share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableSignature(pub String);

/// An element's serialized markup at the moment it was observed. Only meaningful
/// within one exploration branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionSignature(pub String);

impl fmt::Display for StableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StableSignature {
    fn from(value: &str) -> Self {
        StableSignature(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Submit,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Click => f.write_str("click"),
            ActionKind::Submit => f.write_str("submit"),
        }
    }
}

/// Replayable "act on the element matching this signature".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureHandle {
    pub signature: StableSignature,
    pub kind: ActionKind,
    #[serde(default = "default_inject_random_text")]
    pub inject_random_text: bool,
}

fn default_inject_random_text() -> bool {
    true
}

impl SignatureHandle {
    pub fn new(signature: impl Into<StableSignature>, kind: ActionKind) -> Self {
        Self {
            signature: signature.into(),
            kind,
            inject_random_text: true,
        }
    }

    pub fn without_text_injection(mut self) -> Self {
        self.inject_random_text = false;
        self
    }
}

/// An ordered list of actions leading from a freshly loaded page to one UI state.
///
/// `required_signatures` must all be present on the loaded page before the
/// sequence is replayed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSequence {
    pub handles: Vec<SignatureHandle>,
    #[serde(default)]
    pub required_signatures: BTreeSet<StableSignature>,
}

impl SignatureSequence {
    pub fn with_required(required_signatures: BTreeSet<StableSignature>) -> Self {
        Self {
            handles: Vec::new(),
            required_signatures,
        }
    }

    /// This sequence plus one more action; requirements carry over.
    pub fn child(&self, handle: SignatureHandle) -> Self {
        let mut handles = self.handles.clone();
        handles.push(handle);
        Self {
            handles,
            required_signatures: self.required_signatures.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl fmt::Display for SignatureSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.handles.is_empty() {
            return f.write_str("[]");
        }
        let steps: Vec<String> = self
            .handles
            .iter()
            .map(|h| format!("{}({})", h.kind, h.signature))
            .collect();
        write!(f, "[{}]", steps.join(" -> "))
    }
}
