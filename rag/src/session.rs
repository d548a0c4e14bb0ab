use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::build_prompt::QueryTemplate;
use crate::error::{RagError, Result};
use crate::load_pdf::{is_pdf, DocumentFingerprint};
use crate::vector_index::VectorIndex;
use crate::{Answer, Pipeline};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploaded,
    Querying,
}

/// The upload currently sitting at the staging path.
#[derive(Clone, Debug, PartialEq)]
pub struct StagedDocument {
    pub path: PathBuf,
    pub name: String,
    pub fingerprint: DocumentFingerprint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryRejection {
    Blank,
    Busy,
    NoDocument,
    /// Same text as the last processed query for this document.
    Unchanged,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryKind {
    Question(String),
    RecommendedFields,
}

struct CachedIndex {
    fingerprint: DocumentFingerprint,
    index: Arc<VectorIndex>,
}

/// Per-user interaction state: the staged upload, its index and the last query.
///
/// The index is cached by content fingerprint and survives query changes; only a
/// new upload with different bytes invalidates it.
pub struct Session {
    staging_path: PathBuf,
    document: Option<StagedDocument>,
    cache: Option<CachedIndex>,
    last_query: Option<String>,
    in_flight: bool,
}

impl Session {
    pub fn new(staging_path: impl Into<PathBuf>) -> Self {
        Self {
            staging_path: staging_path.into(),
            document: None,
            cache: None,
            last_query: None,
            in_flight: false,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.in_flight {
            Phase::Querying
        } else if self.document.is_some() {
            Phase::Uploaded
        } else {
            Phase::Idle
        }
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    pub fn document(&self) -> Option<&StagedDocument> {
        self.document.as_ref()
    }

    pub fn has_cached_index(&self) -> bool {
        self.current_index().is_some()
    }

    /// Copies `source` over the staging file and makes it the current document.
    pub fn upload(&mut self, source: &Path) -> Result<&StagedDocument> {
        let display = source.display().to_string();
        if self.in_flight {
            return Err(RagError::ingestion(&display, "a request is still running"));
        }
        if !source.is_file() {
            return Err(RagError::ingestion(&display, "file does not exist"));
        }
        if !is_pdf(source) {
            return Err(RagError::ingestion(&display, "only PDF files are supported"));
        }

        let bytes = fs::read(source)
            .map_err(|e| RagError::ingestion(&display, format!("cannot read file: {}", e)))?;
        if source != self.staging_path.as_path() {
            if let Some(parent) = self.staging_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&self.staging_path, &bytes)?;
        }

        let fingerprint = DocumentFingerprint::of_bytes(&bytes);
        if self
            .cache
            .as_ref()
            .is_some_and(|cached| cached.fingerprint != fingerprint)
        {
            self.cache = None;
        }
        self.last_query = None;

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(display);
        tracing::info!(file = %name, fingerprint = fingerprint.short(), "document staged");
        Ok(&*self.document.insert(StagedDocument {
            path: self.staging_path.clone(),
            name,
            fingerprint,
        }))
    }

    /// Starts answering `query` unless it is blank, unchanged, or nothing is uploaded.
    pub fn begin_query(&mut self, query: &str) -> std::result::Result<QueryJob, QueryRejection> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryRejection::Blank);
        }
        if self.last_query.as_deref() == Some(query) && !self.in_flight {
            return Err(QueryRejection::Unchanged);
        }
        let job = self.begin(QueryKind::Question(query.to_string()))?;
        self.last_query = Some(query.to_string());
        Ok(job)
    }

    pub fn begin_recommended_fields(&mut self) -> std::result::Result<QueryJob, QueryRejection> {
        self.begin(QueryKind::RecommendedFields)
    }

    fn begin(&mut self, kind: QueryKind) -> std::result::Result<QueryJob, QueryRejection> {
        if self.in_flight {
            return Err(QueryRejection::Busy);
        }
        let document = self.document.clone().ok_or(QueryRejection::NoDocument)?;
        self.in_flight = true;
        Ok(QueryJob {
            cached: self.current_index(),
            document,
            kind,
        })
    }

    /// Records a finished job. The index is kept only if it belongs to the current upload.
    pub fn finish_query(&mut self, outcome: &QueryOutcome) {
        self.in_flight = false;
        if outcome.answer.is_err() {
            // Let the user resubmit the same text.
            self.last_query = None;
        }
        let Some(index) = &outcome.index else {
            return;
        };
        if self
            .document
            .as_ref()
            .is_some_and(|doc| doc.fingerprint == outcome.fingerprint)
        {
            self.cache = Some(CachedIndex {
                fingerprint: outcome.fingerprint.clone(),
                index: Arc::clone(index),
            });
        }
    }

    /// Removes the staged file and forgets the document.
    pub fn cleanup(&mut self) -> Result<()> {
        self.document = None;
        self.cache = None;
        self.last_query = None;
        match fs::remove_file(&self.staging_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn current_index(&self) -> Option<Arc<VectorIndex>> {
        let doc = self.document.as_ref()?;
        self.cache
            .as_ref()
            .filter(|cached| cached.fingerprint == doc.fingerprint)
            .map(|cached| Arc::clone(&cached.index))
    }
}

/// Work handed to a background thread. Holds everything it needs by value.
pub struct QueryJob {
    pub document: StagedDocument,
    pub kind: QueryKind,
    cached: Option<Arc<VectorIndex>>,
}

pub struct QueryOutcome {
    pub fingerprint: DocumentFingerprint,
    pub kind: QueryKind,
    pub index: Option<Arc<VectorIndex>>,
    pub answer: Result<Answer>,
}

impl QueryJob {
    pub fn needs_index(&self) -> bool {
        self.cached.is_none()
    }

    pub fn run(self, pipeline: &Pipeline) -> QueryOutcome {
        self.run_with(pipeline, || {})
    }

    /// Like `run`, calling `on_indexed` once a fresh index has been built.
    /// Not called when the cached index is reused or the build fails.
    pub fn run_with(self, pipeline: &Pipeline, on_indexed: impl FnOnce()) -> QueryOutcome {
        let fingerprint = self.document.fingerprint.clone();
        let index = match self.cached {
            Some(index) => index,
            None => match pipeline
                .ingest(&self.document.path)
                .and_then(|chunks| pipeline.build_index(chunks))
            {
                Ok(index) => {
                    on_indexed();
                    Arc::new(index)
                }
                Err(err) => {
                    tracing::warn!("index build failed: {}", err);
                    return QueryOutcome {
                        fingerprint,
                        kind: self.kind,
                        index: None,
                        answer: Err(err),
                    };
                }
            },
        };

        let answer = match &self.kind {
            QueryKind::Question(question) => {
                let template = QueryTemplate::interactive(pipeline.config().answer_language.clone());
                pipeline.answer(&index, question, &template)
            }
            QueryKind::RecommendedFields => pipeline.recommend_fields(&index),
        };
        QueryOutcome {
            fingerprint,
            kind: self.kind,
            index: Some(index),
            answer,
        }
    }
}
