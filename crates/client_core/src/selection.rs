//! Keeps the active artifact and the shareable location in agreement.
//!
//! The location wins when it changes from outside (initial load, external
//! navigation); the in-memory selection wins when the user picks or clears an
//! artifact. Restores are two-phase so no lock is held while the artifact list
//! is fetched, and a user action in between retires the pending restore.

use shared::{
    domain::FileId,
    protocol::{FileRecord, FileUploadResponse},
};
use tracing::{debug, warn};
use url::{form_urlencoded, Url};

use crate::{
    error::ClientResult,
    generation::{RequestGeneration, Ticket},
    AnalysisApi,
};

pub const FILE_ID_QUERY_KEY: &str = "fileId";

/// The artifact a session is working on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub file_id: FileId,
    pub filename: String,
    pub file_type: String,
    pub num_chunks: u32,
    pub preview: String,
}

impl From<FileUploadResponse> for ArtifactRef {
    fn from(value: FileUploadResponse) -> Self {
        Self {
            file_id: value.file_id,
            filename: value.filename,
            file_type: value.file_type,
            num_chunks: value.num_chunks,
            preview: value.preview,
        }
    }
}

impl From<&FileRecord> for ArtifactRef {
    fn from(value: &FileRecord) -> Self {
        Self {
            file_id: value.file_id.clone(),
            filename: value.filename.clone(),
            file_type: value.file_type.clone(),
            num_chunks: value.num_chunks,
            preview: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreStep {
    /// Location and memory already agree.
    Unchanged,
    /// Location carries no identifier; the selection was dropped.
    Cleared,
    /// The identifier must be looked up in the artifact list.
    Resolve { file_id: FileId, ticket: Ticket },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Unchanged,
    Cleared,
    Restored(ArtifactRef),
    /// Not listed or the listing failed; selection left empty.
    Unresolved,
    /// A user action or navigation happened while the list was loading.
    Superseded,
}

#[derive(Debug)]
pub struct SelectionSync {
    location: Url,
    selected: Option<ArtifactRef>,
    restores: RequestGeneration,
}

impl SelectionSync {
    pub fn new(location: Url) -> Self {
        Self {
            location,
            selected: None,
            restores: RequestGeneration::new(),
        }
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn selected(&self) -> Option<&ArtifactRef> {
        self.selected.as_ref()
    }

    pub fn location_file_id(&self) -> Option<FileId> {
        self.location
            .query_pairs()
            .find(|(key, _)| key == FILE_ID_QUERY_KEY)
            .map(|(_, value)| FileId::new(value.into_owned()))
            .filter(|file_id| !file_id.as_str().is_empty())
    }

    /// External navigation; follow with a restore.
    pub fn navigate(&mut self, location: Url) {
        self.restores.invalidate();
        self.location = location;
    }

    pub fn plan_restore(&mut self) -> RestoreStep {
        let Some(file_id) = self.location_file_id() else {
            self.restores.invalidate();
            return if self.selected.take().is_some() {
                RestoreStep::Cleared
            } else {
                RestoreStep::Unchanged
            };
        };

        if self
            .selected
            .as_ref()
            .is_some_and(|selected| selected.file_id == file_id)
        {
            return RestoreStep::Unchanged;
        }

        RestoreStep::Resolve {
            file_id,
            ticket: self.restores.begin(),
        }
    }

    pub fn complete_restore(
        &mut self,
        ticket: Ticket,
        file_id: &FileId,
        listing: ClientResult<Vec<FileRecord>>,
    ) -> RestoreOutcome {
        if !self.restores.is_current(ticket) {
            debug!(file_id = %file_id, "selection: restore superseded");
            return RestoreOutcome::Superseded;
        }

        let found = match listing {
            Ok(files) => files
                .iter()
                .find(|record| &record.file_id == file_id)
                .map(ArtifactRef::from),
            Err(err) => {
                warn!(file_id = %file_id, error = %err, "selection: artifact listing failed");
                None
            }
        };

        match found {
            Some(artifact) => {
                debug!(file_id = %file_id, "selection: restored from location");
                self.selected = Some(artifact.clone());
                RestoreOutcome::Restored(artifact)
            }
            None => {
                debug!(file_id = %file_id, "selection: location identifier not found");
                self.selected = None;
                RestoreOutcome::Unresolved
            }
        }
    }

    /// One full resolution pass against `api`.
    pub async fn restore(&mut self, api: &dyn AnalysisApi) -> RestoreOutcome {
        match self.plan_restore() {
            RestoreStep::Unchanged => RestoreOutcome::Unchanged,
            RestoreStep::Cleared => RestoreOutcome::Cleared,
            RestoreStep::Resolve { file_id, ticket } => {
                let listing = api.list_files().await;
                self.complete_restore(ticket, &file_id, listing)
            }
        }
    }

    /// User selection: memory becomes authoritative and the location is
    /// replaced in place, keeping every other query parameter.
    pub fn select(&mut self, artifact: ArtifactRef) -> &Url {
        self.restores.invalidate();
        self.write_file_id(Some(artifact.file_id.as_str()));
        self.selected = Some(artifact);
        &self.location
    }

    pub fn deselect(&mut self) -> &Url {
        self.restores.invalidate();
        self.selected = None;
        self.write_file_id(None);
        &self.location
    }

    /// Rewrites only `fileId` segments; every other segment keeps its raw form.
    fn write_file_id(&mut self, value: Option<&str>) {
        let replacement = value.map(|value| {
            let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
            format!("{FILE_ID_QUERY_KEY}={encoded}")
        });

        let mut segments: Vec<String> = Vec::new();
        let mut written = false;
        for segment in self.location.query().unwrap_or_default().split('&') {
            if segment.is_empty() {
                continue;
            }
            if !is_file_id_segment(segment) {
                segments.push(segment.to_string());
            } else if let (Some(replacement), false) = (&replacement, written) {
                segments.push(replacement.clone());
                written = true;
            }
        }
        if let (Some(replacement), false) = (replacement, written) {
            segments.push(replacement);
        }

        if segments.is_empty() {
            self.location.set_query(None);
        } else {
            self.location.set_query(Some(&segments.join("&")));
        }
    }
}

fn is_file_id_segment(segment: &str) -> bool {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .is_some_and(|(key, _)| key == FILE_ID_QUERY_KEY)
}

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod tests;
