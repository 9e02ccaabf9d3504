use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two document classes accepted by the screening flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Cv,
    ProjectReport,
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cv" => Ok(DocumentKind::Cv),
            "project_report" => Ok(DocumentKind::ProjectReport),
            other => Err(format!("unknown document kind '{other}'")),
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentKind::Cv => "cv",
            DocumentKind::ProjectReport => "project_report",
        };
        f.write_str(s)
    }
}

/// An uploaded-and-extracted document. Immutable once created.
///
/// `text_ref` is an opaque handle the Document Store resolves to the
/// extracted text; callers never interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub text_ref: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(kind: DocumentKind, text_ref: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            text_ref,
            created_at: Utc::now(),
        }
    }
}
