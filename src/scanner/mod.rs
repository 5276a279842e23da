use crate::error::{Result, UploadError};
use photo_upload_common::staging::ACCEPTED_MIME_TYPES;
use photo_upload_common::{FilePayload, ItemId, Staging};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
}

/// 拡張子からMIMEタイプを推定（受け付け対象のみ）
pub fn guess_mime_type(path: &Path) -> Option<String> {
    let mime = mime_guess::from_path(path).first_raw()?;
    if ACCEPTED_MIME_TYPES.contains(&mime) {
        Some(mime.to_string())
    } else {
        None
    }
}

/// フォルダ内の写真・動画を列挙（ファイル名順）
pub fn scan_folder(folder: &Path, recursive: bool) -> Result<Vec<MediaFile>> {
    if !folder.is_dir() {
        return Err(UploadError::FolderNotFound(folder.display().to_string()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        // 隠しファイルは対象外
        if file_name.starts_with('.') {
            continue;
        }

        if let Some(mime_type) = guess_mime_type(path) {
            files.push(MediaFile {
                path: path.to_path_buf(),
                file_name,
                mime_type,
            });
        }
    }

    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    Ok(files)
}

/// ファイルを読み込んで送信用のペイロードにする
pub fn load_payload(file: &MediaFile) -> Result<FilePayload> {
    let bytes = std::fs::read(&file.path)?;
    Ok(FilePayload::new(file.file_name.clone(), bytes, file.mime_type.clone()))
}

/// 列挙したファイルをステージングに追加
///
/// # Returns
/// (追加したID, 追加できなかったファイル名とエラー)
pub fn stage_files(
    staging: &mut Staging,
    files: &[MediaFile],
) -> (Vec<ItemId>, Vec<(String, UploadError)>) {
    let mut staged = Vec::new();
    let mut rejected = Vec::new();

    for file in files {
        let result = load_payload(file).and_then(|payload| Ok(staging.add(payload)?));
        match result {
            Ok(id) => staged.push(id),
            Err(e) => rejected.push((file.file_name.clone(), e)),
        }
    }

    (staged, rejected)
}
