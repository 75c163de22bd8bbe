//! Request types for runs and publishes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::execute::AbortHandle;

/// Name used for the synthetic program substituted for empty requests.
pub const DEFAULT_FILE_NAME: &str = "main.rs";

/// Body of the synthetic program substituted for empty requests.
pub const DEFAULT_PROGRAM: &str = r#"fn main() {
    println!("Hello, World!");
}
"#;

/// A submitted source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// File name, e.g. `main.rs` or `utils.rs`.
    pub name: String,
    /// File contents.
    pub content: String,
    /// Whether this file is the program entry (crate root).
    #[serde(default)]
    pub is_entry: bool,
}

impl SourceFile {
    /// Create a file.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            is_entry: false,
        }
    }

    /// Mark this file as the entry.
    pub fn entry(mut self) -> Self {
        self.is_entry = true;
        self
    }

    /// The synthetic default program.
    pub fn default_program() -> Self {
        Self::new(DEFAULT_FILE_NAME, DEFAULT_PROGRAM).entry()
    }

    /// File stem used as a module name (`utils.rs` -> `utils`).
    pub fn module_name(&self) -> String {
        let stem = self
            .name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.name)
            .trim_end_matches(".rs");
        stem.replace('-', "_")
    }
}

/// Substitute the default program for an empty file list, and pick the entry.
///
/// The entry is the first file flagged `is_entry`, else `main.rs`, else the
/// first file. The returned list has exactly one entry, placed first.
pub fn normalize_files(files: Vec<SourceFile>) -> Vec<SourceFile> {
    if files.is_empty() {
        return vec![SourceFile::default_program()];
    }

    let entry_index = files
        .iter()
        .position(|f| f.is_entry)
        .or_else(|| files.iter().position(|f| f.name == DEFAULT_FILE_NAME))
        .unwrap_or(0);

    let mut ordered = Vec::with_capacity(files.len());
    let mut rest = Vec::with_capacity(files.len() - 1);
    for (i, mut file) in files.into_iter().enumerate() {
        file.is_entry = i == entry_index;
        if file.is_entry {
            ordered.push(file);
        } else {
            rest.push(file);
        }
    }
    ordered.extend(rest);
    ordered
}

/// A requested package (crate) dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    /// Package id (crate name).
    pub id: String,
    /// Version requirement.
    pub version: String,
}

impl PackageRef {
    /// Create a package reference.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Crate name as used in `--extern` and `use` paths.
    pub fn crate_name(&self) -> String {
        self.id.replace('-', "_")
    }
}

impl FromStr for PackageRef {
    type Err = Error;

    /// Parse `id@version` (or bare `id`, meaning any version).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::UnsupportedMode("empty package reference".to_string()));
        }
        match s.split_once('@') {
            Some((id, version)) if !id.is_empty() => Ok(Self::new(id, version)),
            Some(_) => Err(Error::UnsupportedMode(format!(
                "invalid package reference '{}'",
                s
            ))),
            None => Ok(Self::new(s, "*")),
        }
    }
}

/// Language version selector (a Rust edition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LanguageVersion {
    Edition2015,
    Edition2018,
    #[default]
    Edition2021,
    Edition2024,
}

impl LanguageVersion {
    /// Edition string for `rustc --edition` and `Cargo.toml`.
    pub fn as_edition(&self) -> &'static str {
        match self {
            Self::Edition2015 => "2015",
            Self::Edition2018 => "2018",
            Self::Edition2021 => "2021",
            Self::Edition2024 => "2024",
        }
    }

    /// Parse an optional selector, treating absence as the default edition.
    pub fn parse_selector(selector: Option<&str>) -> Result<Self> {
        selector.map_or(Ok(Self::default()), str::parse)
    }
}

impl FromStr for LanguageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::default()),
            "latest" | "2024" => Ok(Self::Edition2024),
            "2021" => Ok(Self::Edition2021),
            "2018" => Ok(Self::Edition2018),
            "2015" => Ok(Self::Edition2015),
            other => Err(Error::UnsupportedMode(format!(
                "unknown language version '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for LanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_edition())
    }
}

/// A request to compile and run a program.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// Source files; an empty list is replaced by the default program.
    pub files: Vec<SourceFile>,
    /// Requested packages.
    pub packages: Vec<PackageRef>,
    /// Language version selector (`None` = default).
    pub language_version: Option<String>,
    /// Declared project type, e.g. `console`, `gui`, `web`.
    pub project_type: String,
    /// Session id correlating later input and stop requests.
    pub session_id: Option<String>,
    /// Cancellation signal for the whole run.
    pub abort: AbortHandle,
}

impl ExecutionRequest {
    /// Convenience constructor for a single-file console program.
    pub fn single_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            files: vec![SourceFile::new(name, content).entry()],
            project_type: "console".to_string(),
            ..Default::default()
        }
    }

    /// Attach a session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Concatenated source text used by the classifier.
    pub fn combined_source(&self) -> String {
        self.files
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A request to publish a program as a downloadable artifact.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// Source files; an empty list is replaced by the default program.
    pub files: Vec<SourceFile>,
    /// Requested packages.
    pub packages: Vec<PackageRef>,
    /// Language version selector (`None` = default).
    pub language_version: Option<String>,
    /// Declared project type.
    pub project_type: String,
    /// Desired output file name (used for the binary and the archive).
    pub output_name: String,
    /// Target triple; `None` = the host triple.
    pub target: Option<String>,
    /// Cancellation signal.
    pub abort: AbortHandle,
}
