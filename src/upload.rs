//! Upload pipeline: multipart intake, staging, archive extraction and the
//! transactional work/chapter creation.

pub mod archive;
pub mod intake;
pub mod pipeline;
pub mod staging;

pub use intake::UploadForm;
pub use pipeline::{ChapterUpload, CreatedChapter, CreatedWork, UploadPipeline, WorkUpload};
pub use staging::StagedFile;
