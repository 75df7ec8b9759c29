pub mod responses;
pub mod router;
pub mod state;
pub mod uploads;

pub use responses::{ApiMessage, ErrorDetail, json_error};
pub use state::AppState;
pub use uploads::{
    FileFieldConfig, UploadError, UploadOutcome, UploadedDocument, process_upload_form,
};
