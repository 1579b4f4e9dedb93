use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UnsupportedFormat;

/// State key under which the most recent file import is stored.
pub const UPLOADED_FILE_KEY: &str = "uploadedFile";
/// State key under which the most recent push-channel payload is stored.
pub const WEBSOCKET_DATA_KEY: &str = "websocketData";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Json,
    Yaml,
    Csv,
}

impl FileFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Csv => "csv",
        }
    }

    /// Maps a file extension (without the dot) to a format. `yml` and `yaml` both map
    /// to YAML.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Derives the format from the text after the last `.` of `file_name`. A name with
    /// no dot is treated as its own extension and therefore rejected.
    pub fn from_file_name(file_name: &str) -> Result<Self, UnsupportedFormat> {
        let extension = file_name.rsplit('.').next().unwrap_or_default();
        Self::from_extension(extension)
            .ok_or_else(|| UnsupportedFormat(extension.to_ascii_lowercase()))
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = UnsupportedFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else if value.eq_ignore_ascii_case("yaml") {
            Ok(Self::Yaml)
        } else if value.eq_ignore_ascii_case("csv") {
            Ok(Self::Csv)
        } else {
            Err(UnsupportedFormat(value.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = UnsupportedFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else if value.eq_ignore_ascii_case("yaml") || value.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else {
            Err(UnsupportedFormat(value.to_string()))
        }
    }
}

/// One successful file import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUpload {
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub format: FileFormat,
    pub data: Value,
}
