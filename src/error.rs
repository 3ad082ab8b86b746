use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedlingError {
    #[error("Syntax error at {line}:{col}: {message}")]
    Syntax { message: String, line: usize, col: usize },
    #[error("Document structure error: {message}\nSee element:\n{element}")]
    DocumentStructure { message: String, element: String },
    #[error("Can not convert string value '{value}' to type '{kind}'.\nSee element:\n{element}")]
    PropertyCoercion { value: String, kind: String, element: String },
    #[error("Type '{type_name}' not found.\nSee element:\n{element}")]
    TypeResolution { type_name: String, element: String },
    #[error("Sequence '{sequence}' has an invalid range: min={min}, max={max}, step={step}")]
    InvalidSequenceRange { sequence: String, min: i64, max: i64, step: i64 },
    #[error("Unknown template function name: {function}")]
    UnknownTemplateFunction { function: String },
    #[error("Template function '{function}' can not use the argument '{argument}'")]
    TemplateArgument { function: String, argument: String },
    #[error("[{class}.{property}] The entity reference name was not found: {reference}")]
    UnresolvedReference { class: String, property: String, reference: String },
    #[error("Previously created instance of the same name '{reference}' has a different type ({existing}) than that ({declared})")]
    ReferenceTypeConflict { reference: String, existing: String, declared: String },
    #[error("Entity constructor is not defined")]
    MissingConstructor,
    #[error("[{class}.{property}] {message}")]
    Binding { class: String, property: String, message: String },
    #[error("[{}] {message}", describe_entity(.class, .reference))]
    Persistence { class: String, reference: String, message: String },
    #[error("Store error: {0}")]
    Store(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Lock poisoned: {0}")]
    Lock(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, SeedlingError>;

fn describe_entity(class: &str, reference: &str) -> String {
    if reference.trim().is_empty() {
        class.to_string()
    } else {
        format!("{class} -> {reference}")
    }
}

impl SeedlingError {
    /// Structural and coercion problems found while building a document,
    /// as opposed to failures raised while a run executes.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. }
                | Self::DocumentStructure { .. }
                | Self::PropertyCoercion { .. }
                | Self::TypeResolution { .. }
                | Self::InvalidSequenceRange { .. }
        )
    }
}

// Helper conversions
impl From<rusqlite::Error> for SeedlingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}
impl From<config::ConfigError> for SeedlingError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
impl From<serde_json::Error> for SeedlingError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}
