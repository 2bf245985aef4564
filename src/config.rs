use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::default_error_response;
use crate::{Error, ErrorResponse, UploadStore};

pub type CreateUid = Arc<dyn Fn() -> String + Send + Sync>;
pub type FormatErrorResponse = Arc<dyn Fn(&Error) -> ErrorResponse + Send + Sync>;

/// Serializable part of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub base_path: String,
}

impl Default for Options {
    fn default() -> Self {
        Options { base_path: "/".to_string() }
    }
}

/// Resolved handler configuration, immutable once built and shared by every
/// request.
#[derive(Clone)]
pub struct Configuration {
    pub(crate) base_path: String,
    pub(crate) store: Arc<dyn UploadStore>,
    pub(crate) create_uid: CreateUid,
    pub(crate) format_error_response: FormatErrorResponse,
}

impl Configuration {
    pub fn builder(store: impl UploadStore + 'static) -> ConfigurationBuilder {
        ConfigurationBuilder::new(Arc::new(store))
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn store(&self) -> &Arc<dyn UploadStore> {
        &self.store
    }

    pub(crate) fn create_uid(&self) -> String {
        (self.create_uid)()
    }

    pub(crate) fn format_error_response(&self, error: &Error) -> ErrorResponse {
        (self.format_error_response)(error)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

/// Builds a [`Configuration`], filling in defaults for anything not set.
pub struct ConfigurationBuilder {
    store: Arc<dyn UploadStore>,
    options: Options,
    create_uid: Option<CreateUid>,
    format_error_response: Option<FormatErrorResponse>,
}

impl ConfigurationBuilder {
    pub fn new(store: Arc<dyn UploadStore>) -> Self {
        ConfigurationBuilder {
            store,
            options: Options::default(),
            create_uid: None,
            format_error_response: None,
        }
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Path the upload collection is served at. Defaults to `/`.
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.options.base_path = base_path.into();
        self
    }

    /// Identifier generator, called once per POST. Defaults to a random UUID.
    pub fn create_uid(mut self, create_uid: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.create_uid = Some(Arc::new(create_uid));
        self
    }

    /// Formatter for failures raised by the store. Defaults to
    /// `400 Request cannot be processed.`
    pub fn format_error_response(
        mut self,
        format: impl Fn(&Error) -> ErrorResponse + Send + Sync + 'static,
    ) -> Self {
        self.format_error_response = Some(Arc::new(format));
        self
    }

    pub fn build(self) -> Configuration {
        let base_path = if self.options.base_path.is_empty() {
            "/".to_string()
        } else {
            self.options.base_path
        };

        Configuration {
            base_path,
            store: self.store,
            create_uid: self.create_uid.unwrap_or_else(|| Arc::new(|| uuid::Uuid::new_v4().to_string())),
            format_error_response: self
                .format_error_response
                .unwrap_or_else(|| Arc::new(default_error_response)),
        }
    }
}
