//! Session parameters and their on-disk record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::ExportRequest;
use crate::error::{SessionError, SessionResult};

const MAX_SUBJECT_LEN: usize = 128;

/// A subject identifier that is safe to use as a directory and file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectName(String);

impl SubjectName {
    pub fn new(name: impl Into<String>) -> SessionResult<Self> {
        let name = name.into();
        let reason = if name.trim().is_empty() {
            Some("must not be empty")
        } else if name.len() > MAX_SUBJECT_LEN {
            Some("longer than 128 bytes")
        } else if name == "." || name == ".." {
            Some("must not be a relative path component")
        } else if !name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
        {
            Some("only letters, digits, space, '-', '_' and '.' are allowed")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(SessionError::InvalidSubject { name, reason }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubjectName {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubjectName> for String {
    fn from(value: SubjectName) -> Self {
        value.0
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stimulus tokens shown by the frontend.
///
/// Normally a list of trials, each a list of tokens. Older frontends send
/// one flat list; both are kept exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StimulusSequence {
    Nested(Vec<Vec<String>>),
    Flat(Vec<String>),
}

impl StimulusSequence {
    pub fn token_count(&self) -> usize {
        match self {
            StimulusSequence::Nested(trials) => trials.iter().map(Vec::len).sum(),
            StimulusSequence::Flat(tokens) => tokens.len(),
        }
    }
}

impl Default for StimulusSequence {
    fn default() -> Self {
        StimulusSequence::Nested(Vec::new())
    }
}

/// Where and how a finished record is exported.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub folder: PathBuf,
    pub format: String,
    pub version: String,
    pub stream_types: Vec<String>,
}

impl ExportSettings {
    pub fn from_config(folder: impl Into<PathBuf>, recording: &emoconf::RecordingConfig) -> Self {
        Self {
            folder: folder.into(),
            format: recording.export_format.clone(),
            version: recording.export_version.clone(),
            stream_types: recording.stream_types.clone(),
        }
    }

    /// Export request for exactly one record.
    pub fn request_for(&self, record_id: &str) -> ExportRequest {
        ExportRequest {
            folder: self.folder.clone(),
            stream_types: self.stream_types.clone(),
            format: self.format.clone(),
            record_ids: vec![record_id.to_string()],
            version: self.version.clone(),
        }
    }
}

/// Everything one recording needs. Built once per start request and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParameters {
    pub subject_name: SubjectName,
    pub run_id: i64,
    /// Zero records until an explicit stop; anything else auto-stops.
    pub duration: Duration,
    pub export: ExportSettings,
    pub sequence: StimulusSequence,
    /// Seconds, as sent by the frontend.
    pub cursor_delay: f64,
    /// Seconds, as sent by the frontend.
    pub word_delay: f64,
    pub common_event_time: Option<String>,
    pub record_title: String,
    pub record_description: String,
    pub headset_id: Option<String>,
}

impl SessionParameters {
    /// Parameters with config-derived defaults for everything the start
    /// request does not carry.
    pub fn new(
        subject_name: SubjectName,
        run_id: i64,
        export: ExportSettings,
        recording: &emoconf::RecordingConfig,
    ) -> Self {
        Self {
            subject_name,
            run_id,
            duration: Duration::ZERO,
            export,
            sequence: StimulusSequence::default(),
            cursor_delay: 0.0,
            word_delay: 0.0,
            common_event_time: None,
            record_title: recording.record_title.clone(),
            record_description: recording.record_description.clone(),
            headset_id: None,
        }
    }

    /// Check the values a client controls.
    pub fn validate(&self) -> SessionResult<()> {
        for (field, value) in [("cursor_delay", self.cursor_delay), ("word_delay", self.word_delay)] {
            if !value.is_finite() || value < 0.0 {
                return Err(SessionError::InvalidParameter {
                    field,
                    reason: format!("must be a non-negative number of seconds, got {value}"),
                });
            }
        }
        if self.record_title.trim().is_empty() {
            return Err(SessionError::InvalidParameter {
                field: "record_title",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Fixed recording length, if this is a legacy timed recording.
    pub fn auto_stop(&self) -> Option<Duration> {
        (!self.duration.is_zero()).then_some(self.duration)
    }
}

/// The JSON document written next to each recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedParams {
    pub subject_name: String,
    pub run_id: i64,
    pub sequence: StimulusSequence,
    pub cursor_delay: f64,
    pub word_delay: f64,
    pub duration_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_event_time: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl From<&SessionParameters> for PersistedParams {
    fn from(params: &SessionParameters) -> Self {
        Self {
            subject_name: params.subject_name.to_string(),
            run_id: params.run_id,
            sequence: params.sequence.clone(),
            cursor_delay: params.cursor_delay,
            word_delay: params.word_delay,
            duration_secs: params.duration.as_secs(),
            common_event_time: params.common_event_time.clone(),
            saved_at: Utc::now(),
        }
    }
}

/// Writes `{dir}/{subject}_{run}_params.json`.
#[derive(Debug, Clone)]
pub struct ParamsStore {
    dir: PathBuf,
}

impl ParamsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, subject: &SubjectName, run_id: i64) -> PathBuf {
        self.dir.join(format!("{subject}_{run_id}_params.json"))
    }

    /// Persist parameters, replacing any earlier file for the same run.
    pub fn save(&self, params: &SessionParameters) -> SessionResult<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| SessionError::io(&self.dir, e))?;

        let path = self.path_for(&params.subject_name, params.run_id);
        let json = serde_json::to_vec_pretty(&PersistedParams::from(params))?;
        fs::write(&path, json).map_err(|e| SessionError::io(&path, e))?;

        tracing::debug!(path = %path.display(), "saved session parameters");
        Ok(path)
    }

    pub fn load(&self, subject: &SubjectName, run_id: i64) -> SessionResult<PersistedParams> {
        let path = self.path_for(subject, run_id);
        let bytes = fs::read(&path).map_err(|e| SessionError::io(&path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
