//! Tool argument schema and validation.
//!
//! Arguments arrive as loosely-typed JSON. They are deserialized into a
//! typed parameter struct and validated here, before any job exists.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DispatchError;
use crate::session::SessionId;

/// Name of the image generation tool.
pub const GENERATE_IMAGE: &str = "generate_image";

/// Tools the dispatcher accepts.
pub const REGISTERED_TOOLS: &[&str] = &[GENERATE_IMAGE];

/// Maximum prompt length, in characters.
pub const MAX_PROMPT_LENGTH: usize = 1920;

/// Minimum number of images that can be generated.
pub const MIN_NUMBER_OF_IMAGES: u32 = 1;

/// Maximum number of images that can be generated.
pub const MAX_NUMBER_OF_IMAGES: u32 = 4;

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Tall,
    #[default]
    #[serde(rename = "16:9")]
    Wide,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
        AspectRatio::Tall,
        AspectRatio::Wide,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Tall => "9:16",
            AspectRatio::Wide => "16:9",
        }
    }
}

/// Output resolution class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
        }
    }
}

/// Whether the backend may depict people.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PersonGeneration {
    DontAllow,
    #[default]
    AllowAdult,
    AllowAll,
}

impl PersonGeneration {
    pub fn as_str(self) -> &'static str {
        match self {
            PersonGeneration::DontAllow => "dont_allow",
            PersonGeneration::AllowAdult => "allow_adult",
            PersonGeneration::AllowAll => "allow_all",
        }
    }
}

/// Arguments of the `generate_image` tool.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerateImageParams {
    /// Text prompt describing the image to generate (at most 1920 characters).
    pub prompt: String,

    /// What to keep out of the generated image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    /// Aspect ratio: "1:1", "3:4", "4:3", "9:16" or "16:9".
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Number of images to generate (1-4).
    #[serde(default = "default_number_of_images")]
    pub number_of_images: u32,

    /// Output resolution: "1K" or "2K".
    #[serde(default)]
    pub image_size: ImageSize,

    /// People policy: "dont_allow", "allow_adult" or "allow_all".
    #[serde(default)]
    pub person_generation: PersonGeneration,
}

fn default_number_of_images() -> u32 {
    1
}

impl GenerateImageParams {
    /// Parameters for `prompt` with every option at its default.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            aspect_ratio: AspectRatio::default(),
            number_of_images: default_number_of_images(),
            image_size: ImageSize::default(),
            person_generation: PersonGeneration::default(),
        }
    }

    /// Validate the parameters.
    ///
    /// # Returns
    /// - `Ok(())` if all parameters are valid
    /// - `Err(Vec<ValidationError>)` with all validation errors
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.prompt.trim().is_empty() {
            errors.push(ValidationError::new("prompt", "Prompt cannot be empty"));
        }

        let prompt_len = self.prompt.chars().count();
        if prompt_len > MAX_PROMPT_LENGTH {
            errors.push(ValidationError::new(
                "prompt",
                format!("Prompt length {} exceeds maximum {}", prompt_len, MAX_PROMPT_LENGTH),
            ));
        }

        if let Some(negative) = &self.negative_prompt {
            let len = negative.chars().count();
            if len > MAX_PROMPT_LENGTH {
                errors.push(ValidationError::new(
                    "negative_prompt",
                    format!("Negative prompt length {} exceeds maximum {}", len, MAX_PROMPT_LENGTH),
                ));
            }
        }

        if !(MIN_NUMBER_OF_IMAGES..=MAX_NUMBER_OF_IMAGES).contains(&self.number_of_images) {
            errors.push(ValidationError::new(
                "number_of_images",
                format!(
                    "number_of_images must be between {} and {}, got {}",
                    MIN_NUMBER_OF_IMAGES, MAX_NUMBER_OF_IMAGES, self.number_of_images
                ),
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Validation error details for tool arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A tool invocation as received from a transport.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub session_id: Option<SessionId>,
}

impl ToolRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Build a request from a JSON value; anything but an object yields empty arguments.
    pub fn from_value(tool_name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(tool_name, arguments)
    }
}

/// A validated, typed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    GenerateImage(GenerateImageParams),
}

impl ToolCall {
    /// Resolve and validate a [`ToolRequest`].
    ///
    /// # Errors
    /// `DispatchError::InvalidRequest` for unknown tools, malformed arguments
    /// or failed validation. All validation failures are reported together.
    pub fn parse(request: &ToolRequest) -> Result<Self, DispatchError> {
        match request.tool_name.as_str() {
            GENERATE_IMAGE => {
                let params: GenerateImageParams =
                    serde_json::from_value(Value::Object(request.arguments.clone())).map_err(|e| {
                        DispatchError::InvalidRequest(format!(
                            "Invalid arguments for {}: {}",
                            GENERATE_IMAGE, e
                        ))
                    })?;
                params.validate().map_err(|errors| {
                    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                    DispatchError::InvalidRequest(messages.join("; "))
                })?;
                Ok(ToolCall::GenerateImage(params))
            }
            other => Err(DispatchError::InvalidRequest(format!(
                "Unknown tool '{}'. Registered tools: {}",
                other,
                REGISTERED_TOOLS.join(", ")
            ))),
        }
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolCall::GenerateImage(_) => GENERATE_IMAGE,
        }
    }
}

/// JSON schema of `T` as an MCP tool input schema.
pub fn input_schema<T: JsonSchema>() -> Arc<Map<String, Value>> {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(&schema) {
        Ok(Value::Object(map)) => Arc::new(map),
        _ => Arc::new(Map::new()),
    }
}
