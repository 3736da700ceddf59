//! Recording history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Media type of a finished recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingKind {
    Audio,
    Video,
}

impl RecordingKind {
    /// Library category new recordings of this kind are filed under.
    pub fn library_category(self) -> &'static str {
        match self {
            Self::Audio => "Audio",
            Self::Video => "Movies",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Audio => "Audio",
            Self::Video => "Video",
        }
    }
}

impl std::str::FromStr for RecordingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown recording kind '{other}'")),
        }
    }
}

/// One past recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingEntry {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RecordingKind,
    /// Day the recording was made (`YYYY-MM-DD`).
    pub date: NaiveDate,
    /// Length as `MM:SS`.
    pub duration: String,
}

impl RecordingEntry {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        kind: RecordingKind,
        date: NaiveDate,
        duration: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            date,
            duration: duration.into(),
        }
    }
}

/// Entries shown before anything has been recorded.
pub fn sample_history() -> Vec<RecordingEntry> {
    let entries = [
        (1, "Patient Interview Notes", RecordingKind::Audio, (2023, 4, 12), "12:34"),
        (2, "Surgery Explanation", RecordingKind::Video, (2023, 4, 10), "05:46"),
        (3, "Medication Instructions", RecordingKind::Audio, (2023, 4, 7), "03:21"),
    ];
    entries
        .into_iter()
        .filter_map(|(id, name, kind, (y, m, d), duration)| {
            NaiveDate::from_ymd_opt(y, m, d)
                .map(|date| RecordingEntry::new(id, name, kind, date, duration))
        })
        .collect()
}
