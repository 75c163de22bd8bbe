//! Messages exchanged with clients.
//!
//! WebSocket frames are JSON objects tagged by `type`. Streamed run events
//! use the `{type, content}` shape of [`OutputEvent`] plus the `session_id`
//! of the run they belong to, so one connection can multiplex runs.

use serde::{Deserialize, Serialize};

use runbox_core::{
    EventKind, ExecutionRequest, OutputEvent, PackageRef, PublishRequest, PublishResult, SourceFile,
};

/// Messages sent from client to server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Compile and run a program.
    Run {
        /// Program source.
        #[serde(flatten)]
        program: ProgramPayload,
        /// Session id for later input and stop requests; assigned when absent.
        #[serde(default)]
        session_id: Option<String>,
    },

    /// A line of input for a running program.
    Input {
        /// Target session.
        session_id: String,
        /// Line text, without the newline.
        text: String,
    },

    /// Stop a running program.
    Stop {
        /// Target session.
        session_id: String,
    },
}

/// Messages sent from server to client over the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A run was accepted.
    Started {
        /// Session id of the run.
        session_id: String,
    },

    /// Program stdout or build progress.
    Output {
        /// Run the event belongs to.
        session_id: String,
        /// Text chunk.
        content: String,
    },

    /// Program stderr, diagnostics, and run errors.
    Error {
        /// Run the event belongs to.
        session_id: String,
        /// Text chunk.
        content: String,
    },

    /// End of a run; exactly one per run.
    Completed {
        /// Run the event belongs to.
        session_id: String,
        /// Summary.
        content: String,
    },

    /// Answer to an input message.
    InputResult {
        session_id: String,
        accepted: bool,
    },

    /// Answer to a stop message.
    StopResult {
        session_id: String,
        stopped: bool,
    },

    /// The client sent something the server could not understand.
    ProtocolError {
        /// Error description.
        message: String,
    },
}

impl ServerMessage {
    /// Wrap a run event of `session_id`.
    pub fn event(session_id: impl Into<String>, event: OutputEvent) -> Self {
        let session_id = session_id.into();
        let content = event.content;
        match event.kind {
            EventKind::Output => Self::Output { session_id, content },
            EventKind::Error => Self::Error { session_id, content },
            EventKind::Completed => Self::Completed { session_id, content },
        }
    }
}

/// Program shape shared by run and publish requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramPayload {
    /// Source files; empty means the default program.
    #[serde(default)]
    pub files: Vec<SourceFile>,
    /// Requested packages.
    #[serde(default)]
    pub packages: Vec<PackageRef>,
    /// Edition selector.
    #[serde(default)]
    pub language_version: Option<String>,
    /// Declared project type.
    #[serde(default)]
    pub project_type: String,
}

impl ProgramPayload {
    /// Build an execution request for `session_id`.
    pub fn into_execution_request(self, session_id: String) -> ExecutionRequest {
        ExecutionRequest {
            files: self.files,
            packages: self.packages,
            language_version: self.language_version,
            project_type: self.project_type,
            session_id: Some(session_id),
            ..Default::default()
        }
    }
}

/// `POST /api/input` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputRequest {
    pub session_id: String,
    pub text: String,
}

/// `POST /api/input` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputResponse {
    pub success: bool,
}

/// `POST /api/stop` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub session_id: String,
}

/// `POST /api/stop` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub success: bool,
    pub message: String,
}

impl StopResponse {
    pub fn from_stopped(stopped: bool) -> Self {
        Self {
            success: stopped,
            message: if stopped {
                "Stopped".to_string()
            } else {
                "Nothing to stop".to_string()
            },
        }
    }
}

/// `POST /api/publish` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishApiRequest {
    #[serde(flatten)]
    pub program: ProgramPayload,
    /// Desired output file name.
    #[serde(default)]
    pub output_name: String,
    /// Target triple; host when absent.
    #[serde(default)]
    pub target: Option<String>,
}

impl PublishApiRequest {
    pub fn into_publish_request(self) -> PublishRequest {
        PublishRequest {
            files: self.program.files,
            packages: self.program.packages,
            language_version: self.program.language_version,
            project_type: self.program.project_type,
            output_name: self.output_name,
            target: self.target,
            ..Default::default()
        }
    }
}

/// `POST /api/publish` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishResponse {
    pub success: bool,
    pub artifact_path: Option<String>,
    pub size_bytes: u64,
    pub error: Option<String>,
    /// Where to download the artifact.
    pub download_url: Option<String>,
    /// Build output.
    #[serde(default)]
    pub log: Vec<String>,
}

impl PublishResponse {
    /// Response for `result`, downloadable under `download_url`.
    pub fn new(result: PublishResult, download_url: Option<String>) -> Self {
        Self {
            success: result.success,
            artifact_path: result.artifact_path.map(|p| p.display().to_string()),
            size_bytes: result.size_bytes,
            error: result.error,
            download_url,
            log: result.log,
        }
    }
}
