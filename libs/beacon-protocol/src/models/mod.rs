//! Beacon wire models
//!
//! Binary-safe fields (`path`, `output`, file contents) travel base64 encoded.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Literal status a script reports on success
pub const STATUS_OK: &str = "ok";

/// Protocol decoding error
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid base64 in `{field}`: {source}")]
    InvalidBase64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
}

/// A request sent to the beacon, tagged by `cmd`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum BeaconRequest {
    /// Run a named maintenance script with variables
    TransmitScript {
        script: String,
        #[serde(default)]
        vars: Map<String, Value>,
    },

    /// Run a framework console command
    TransmitArtisan { artisan: String },

    /// Store a file on the target
    TransmitFile { filename: String, contents: String },
}

impl BeaconRequest {
    pub fn script(name: impl Into<String>, vars: Map<String, Value>) -> Self {
        BeaconRequest::TransmitScript {
            script: name.into(),
            vars,
        }
    }

    pub fn artisan(command: impl Into<String>) -> Self {
        BeaconRequest::TransmitArtisan {
            artisan: command.into(),
        }
    }

    /// Build a file transfer request, encoding the raw bytes
    pub fn file(filename: impl Into<String>, bytes: &[u8]) -> Self {
        BeaconRequest::TransmitFile {
            filename: filename.into(),
            contents: BASE64.encode(bytes),
        }
    }

    /// Wire name of the command
    pub fn command_name(&self) -> &'static str {
        match self {
            BeaconRequest::TransmitScript { .. } => "transmitScript",
            BeaconRequest::TransmitArtisan { .. } => "transmitArtisan",
            BeaconRequest::TransmitFile { .. } => "transmitFile",
        }
    }
}

/// Response to `transmitScript`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResponse {
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScriptResponse {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Response to `transmitArtisan`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtisanResponse {
    #[serde(rename = "errCode", deserialize_with = "int_or_decimal_string")]
    pub err_code: i64,

    /// Base64 encoded console output
    #[serde(default)]
    pub output: String,
}

impl ArtisanResponse {
    pub fn is_ok(&self) -> bool {
        self.err_code == 0
    }

    /// Decode the console output, replacing invalid UTF-8
    pub fn decode_output(&self) -> Result<String, ProtocolError> {
        decode_field("output", &self.output)
    }
}

/// Response to `transmitFile`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResponse {
    /// Base64 encoded path the file was stored at
    #[serde(default)]
    pub path: Option<String>,
}

impl FileResponse {
    /// Decoded remote path, `None` when the beacon did not report one
    pub fn decode_path(&self) -> Result<Option<String>, ProtocolError> {
        match self.path.as_deref() {
            None | Some("") => Ok(None),
            Some(encoded) => {
                let path = decode_field("path", encoded)?;
                Ok(if path.is_empty() { None } else { Some(path) })
            }
        }
    }
}

fn decode_field(field: &'static str, encoded: &str) -> Result<String, ProtocolError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|source| ProtocolError::InvalidBase64 { field, source })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// PHP agents emit errCode either as a JSON number or as a decimal string
fn int_or_decimal_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(code) => Ok(code),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("errCode is not a decimal integer: {text}"))),
    }
}
