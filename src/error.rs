use std::path::PathBuf;

use thiserror::Error;

/// Conditions that abort an extraction run. Everything else is recorded as a
/// [`crate::model::Diagnostic`] and surfaced by the validator.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("required definition file missing: {0}")]
    MissingDefinitionFile(PathBuf),

    #[error("verse anchor `{id}` in {file} does not match <Abbrev>_vchap<Chapter>-<Verse>")]
    MalformedAnchor { id: String, file: String },

    #[error("verse anchor `{id}` in {file} uses unknown book abbreviation `{abbreviation}`")]
    UnknownAbbreviation {
        id: String,
        file: String,
        abbreviation: String,
    },
}
