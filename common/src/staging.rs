//! ローカルステージング
//!
//! 選択されたファイルを送信前に保持し、キャプション・チーム紐付けを編集する。
//! サーバとの通信は行わない。

use crate::error::{Error, Result};
use crate::types::{
    FilePayload, ItemId, MediaItem, MediaKind, SubmissionRequest, SubmissionResult,
    SubmissionStatus, TeamAssociation,
};

/// 受け付けるMIMEタイプ
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/heic",
    "image/heif",
    "video/mp4",
    "video/quicktime",
    "video/webm",
];

/// 種別ごとのサイズ上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingLimits {
    pub max_photo_bytes: u64,
    pub max_video_bytes: u64,
}

impl StagingLimits {
    pub fn max_bytes(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Photo => self.max_photo_bytes,
            MediaKind::Video => self.max_video_bytes,
        }
    }
}

impl Default for StagingLimits {
    fn default() -> Self {
        Self {
            max_photo_bytes: 20 * 1024 * 1024,
            max_video_bytes: 200 * 1024 * 1024,
        }
    }
}

/// ファイルの種別・サイズを検証して種別を返す
///
/// # Returns
/// * `Ok(MediaKind)` - 受け付け可能
/// * `Err(Error::Validation)` - 空ファイル・未対応形式・サイズ超過
pub fn validate_file(file: &FilePayload, limits: &StagingLimits) -> Result<MediaKind> {
    if file.name.trim().is_empty() {
        return Err(Error::Validation("file name is required".into()));
    }

    let mime = file.mime_type.trim().to_ascii_lowercase();
    if !ACCEPTED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(Error::Validation(format!(
            "{}: unsupported file type {}",
            file.name, file.mime_type
        )));
    }

    let kind = MediaKind::from_mime(&mime)
        .ok_or_else(|| Error::Validation(format!("{}: unsupported file type", file.name)))?;

    if file.size() == 0 {
        return Err(Error::Validation(format!("{}: file is empty", file.name)));
    }

    let max = limits.max_bytes(kind);
    if file.size() > max {
        return Err(Error::Validation(format!(
            "{}: file is too large ({} bytes, limit {} bytes)",
            file.name,
            file.size(),
            max
        )));
    }

    Ok(kind)
}

/// ステージング領域
#[derive(Debug, Clone, Default)]
pub struct Staging {
    items: Vec<MediaItem>,
    limits: StagingLimits,
}

impl Staging {
    pub fn new(limits: StagingLimits) -> Self {
        Self {
            items: Vec::new(),
            limits,
        }
    }

    /// ファイルを追加（検証NGなら追加しない）
    pub fn add(&mut self, file: FilePayload) -> Result<ItemId> {
        let kind = validate_file(&file, &self.limits)?;
        let id = ItemId::new();

        self.items.push(MediaItem {
            id,
            file,
            caption: None,
            team: TeamAssociation::Unset,
            kind,
            status: SubmissionStatus::Pending,
        });

        Ok(id)
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn get(&self, id: ItemId) -> Option<&MediaItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut MediaItem> {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(Error::UnknownItem(id))
    }

    /// キャプション設定（空白のみはNone扱い）
    pub fn set_caption(&mut self, id: ItemId, caption: Option<String>) -> Result<()> {
        let caption = caption
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self.item_mut(id)?.caption = caption;
        Ok(())
    }

    pub fn set_team(&mut self, id: ItemId, team: TeamAssociation) -> Result<()> {
        self.item_mut(id)?.team = team;
        Ok(())
    }

    /// ステータス遷移（許可されない遷移はエラー）
    pub fn transition(&mut self, id: ItemId, next: SubmissionStatus) -> Result<()> {
        let item = self.item_mut(id)?;
        if !item.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: item.status,
                to: next,
            });
        }
        item.status = next;
        Ok(())
    }

    pub fn mark_ready(&mut self, id: ItemId) -> Result<()> {
        self.transition(id, SubmissionStatus::Ready)
    }

    /// Pendingの項目をすべてReadyにする
    pub fn mark_all_ready(&mut self) -> usize {
        let mut count = 0;
        for item in self
            .items
            .iter_mut()
            .filter(|item| item.status == SubmissionStatus::Pending)
        {
            item.status = SubmissionStatus::Ready;
            count += 1;
        }
        count
    }

    /// ユーザー操作による削除
    pub fn remove(&mut self, id: ItemId) -> Result<MediaItem> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or(Error::UnknownItem(id))?;
        Ok(self.items.remove(index))
    }

    /// 送信済みの項目を取り除く
    pub fn remove_submitted(&mut self) -> usize {
        let before = self.items.len();
        self.items
            .retain(|item| item.status != SubmissionStatus::Submitted);
        before - self.items.len()
    }

    /// 送信対象（Ready・Failed）のリクエストを作成（ステージング順）
    pub fn submission_requests(&self, game_id: u64) -> Vec<SubmissionRequest> {
        self.items
            .iter()
            .filter(|item| {
                matches!(
                    item.status,
                    SubmissionStatus::Ready | SubmissionStatus::Failed
                )
            })
            .map(|item| SubmissionRequest {
                item_id: item.id,
                file: item.file.clone(),
                game_id,
                caption: item.caption.clone(),
                team: item.team,
                kind: item.kind,
            })
            .collect()
    }

    /// 送信結果を反映（Submitting → Submitted / Failed）
    pub fn apply_result(&mut self, result: &SubmissionResult) -> Result<()> {
        let next = if result.succeeded {
            SubmissionStatus::Submitted
        } else {
            SubmissionStatus::Failed
        };
        self.transition(result.item_id, next)
    }
}
