use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Modality part names the prediction API expects, in upload order.
pub const MODALITIES: [&str; 4] = ["t1", "t1ce", "t2", "flair"];

#[derive(Error, Debug)]
pub enum UploadCaseError {
    #[error("Failed to read case directory {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        source: std::io::Error,
    },
    #[error("Expected one file for modality {modality}, got {count}")]
    ModalityCount {
        modality: &'static str,
        count: usize,
    },
    #[error("Empty file for modality {modality}")]
    EmptyFile { modality: &'static str },
    #[error("Failed to read modality {modality}: {source}")]
    ReadFile {
        modality: &'static str,
        source: std::io::Error,
    },
}

#[derive(Debug)]
struct ModalityFile {
    modality: &'static str,
    path: PathBuf,
}

/// One BraTS case resolved from a directory: exactly one NIfTI file per
/// modality, named `*_<modality>.nii` or `*_<modality>.nii.gz`.
#[derive(Debug)]
pub struct UploadCase {
    files: Vec<ModalityFile>,
}

impl UploadCase {
    pub fn from_dir(dir: &Path) -> Result<Self, UploadCaseError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|source| UploadCaseError::ReadDir {
                dir: dir.to_path_buf(),
                source,
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| UploadCaseError::ReadDir {
                dir: dir.to_path_buf(),
                source,
            })?;

        let mut files = Vec::with_capacity(MODALITIES.len());
        for modality in MODALITIES {
            let matches: Vec<&std::fs::DirEntry> = entries
                .iter()
                .filter(|entry| {
                    entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| matches_modality(name, modality))
                })
                .collect();

            if matches.len() != 1 {
                return Err(UploadCaseError::ModalityCount {
                    modality,
                    count: matches.len(),
                });
            }

            let path = matches[0].path();
            let len = path
                .metadata()
                .map_err(|source| UploadCaseError::ReadFile { modality, source })?
                .len();
            if len == 0 {
                return Err(UploadCaseError::EmptyFile { modality });
            }

            files.push(ModalityFile { modality, path });
        }

        Ok(Self { files })
    }

    /// Builds the multipart form, one file part per modality. Reads the
    /// files fresh on every call so a resubmission picks up edits.
    pub async fn to_form(&self) -> Result<Form, UploadCaseError> {
        let mut form = Form::new();
        for file in &self.files {
            let bytes = tokio::fs::read(&file.path)
                .await
                .map_err(|source| UploadCaseError::ReadFile {
                    modality: file.modality,
                    source,
                })?;
            let file_name = file
                .path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("upload.nii.gz")
                .to_string();
            form = form.part(file.modality, Part::bytes(bytes).file_name(file_name));
        }
        Ok(form)
    }
}

fn matches_modality(name: &str, modality: &str) -> bool {
    name.ends_with(&format!("_{modality}.nii")) || name.ends_with(&format!("_{modality}.nii.gz"))
}
