use std::collections::HashMap;

use axum::extract::Multipart;

/// Result type used by the shared upload helpers.
pub type UploadResult<T> = Result<T, UploadError>;

/// Error returned when reading or validating uploaded files.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to read upload form: {0}")]
    Malformed(String),
    #[error("Unsupported file field: `{0}`")]
    UnexpectedField(String),
    #[error("Maximum {max} {label} files allowed")]
    TooManyFiles { max: usize, label: &'static str },
    #[error("At least {min} {label} file(s) required")]
    TooFewFiles { min: usize, label: &'static str },
    #[error("File {filename} is not a {label}")]
    DisallowedExtension {
        filename: String,
        label: &'static str,
    },
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// Configuration describing the expectations for a single multipart file field.
#[derive(Debug, Clone, Copy)]
pub struct FileFieldConfig<'a> {
    pub field_name: &'a str,
    /// Lowercase suffixes including the dot, e.g. `".pdf"`.
    pub allowed_suffixes: &'a [&'a str],
    pub label: &'static str,
    pub max_files: usize,
    pub min_files: usize,
}

impl<'a> FileFieldConfig<'a> {
    pub fn new(
        field_name: &'a str,
        allowed_suffixes: &'a [&'a str],
        label: &'static str,
        max_files: usize,
    ) -> Self {
        Self {
            field_name,
            allowed_suffixes,
            label,
            max_files,
            min_files: if max_files == 0 { 0 } else { 1 },
        }
    }

    /// Count limits are checked before any filename, so an oversized batch is
    /// rejected for its size even when it also contains bad names.
    pub fn validate(&self, files: &[UploadedDocument]) -> UploadResult<()> {
        if files.len() > self.max_files {
            return Err(UploadError::TooManyFiles {
                max: self.max_files,
                label: self.label,
            });
        }
        if files.len() < self.min_files {
            return Err(UploadError::TooFewFiles {
                min: self.min_files,
                label: self.label,
            });
        }

        for file in files {
            let lowered = file.filename.to_lowercase();
            let allowed = self.allowed_suffixes.is_empty()
                || self
                    .allowed_suffixes
                    .iter()
                    .any(|suffix| lowered.ends_with(suffix));
            if file.filename.is_empty() || !allowed {
                return Err(UploadError::DisallowedExtension {
                    filename: file.filename.clone(),
                    label: self.label,
                });
            }
        }

        Ok(())
    }
}

/// One uploaded file held in memory for the duration of a request.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub field_name: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Aggregated output of the shared upload processor.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub files: Vec<UploadedDocument>,
    pub text_fields: HashMap<String, Vec<String>>,
}

impl UploadOutcome {
    pub fn files_for<'a>(&'a self, field_name: &str) -> impl Iterator<Item = &'a UploadedDocument> {
        self.files
            .iter()
            .filter(move |file| file.field_name == field_name)
    }

    pub fn take_files_for(&mut self, field_name: &str) -> Vec<UploadedDocument> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|file| file.field_name == field_name);
        self.files = kept;
        taken
    }

    pub fn first_text(&self, field_name: &str) -> Option<&str> {
        self.text_fields
            .get(field_name)
            .and_then(|values| values.first().map(|s| s.as_str()))
    }
}

/// Read the whole multipart form into memory and validate each configured file field.
///
/// Nothing is written to disk; files are discarded when the outcome is dropped.
pub async fn process_upload_form(
    mut multipart: Multipart,
    field_configs: &[FileFieldConfig<'_>],
) -> UploadResult<UploadOutcome> {
    let mut outcome = UploadOutcome::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::Malformed(err.to_string()))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let value = field
                .text()
                .await
                .map_err(|err| UploadError::Malformed(format!("field `{field_name}`: {err}")))?;
            outcome
                .text_fields
                .entry(field_name)
                .or_default()
                .push(value);
            continue;
        };

        if !field_configs
            .iter()
            .any(|config| config.field_name == field_name)
        {
            return Err(UploadError::UnexpectedField(field_name));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|err| UploadError::Malformed(format!("file `{file_name}`: {err}")))?;

        outcome.files.push(UploadedDocument {
            field_name,
            filename: file_name,
            bytes: bytes.to_vec(),
        });
    }

    for config in field_configs {
        let files: Vec<UploadedDocument> = outcome.files_for(config.field_name).cloned().collect();
        config.validate(&files)?;
    }

    Ok(outcome)
}
