use serde::Serialize;

use crate::{
    error::{PackError, Result},
    runtime::ScormVersion,
    util,
};

pub const DEFAULT_TITLE: &str = "Module SCORM";
pub const DEFAULT_DURATION: &str = "00:05:00";
pub const DEFAULT_SCORE_THRESHOLD: u8 = 80;
pub const MEDIA_DIR: &str = "media";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Audio,
    Video,
    Document,
}

impl MediaKind {
    pub fn from_file_name(name: &str) -> Self {
        match util::extension(name).as_deref() {
            Some("pdf") => Self::Pdf,
            Some("mp3") => Self::Audio,
            Some("mp4") => Self::Video,
            _ => Self::Document,
        }
    }
}

/// An uploaded media file as received from the form.
#[derive(Debug, Clone)]
pub struct SourceMedia {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceMedia {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_file_name(&self.name)
    }

    /// Path of the media inside the package. Named uploads live under
    /// `media/` so they never shadow the generated root files.
    pub fn payload_name(&self) -> String {
        match self.kind() {
            MediaKind::Pdf => "document.pdf".to_string(),
            MediaKind::Video => "video/video.mp4".to_string(),
            MediaKind::Audio | MediaKind::Document => {
                format!("{MEDIA_DIR}/{}", util::sanitize_file_name(&self.name))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum CourseSource {
    Upload(SourceMedia),
    Remote { url: String },
}

/// Conditions that must all hold before the SCO reports completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionCriteria {
    pub time: bool,
    pub pages: bool,
    pub score_threshold: Option<u8>,
}

impl Default for CompletionCriteria {
    fn default() -> Self {
        Self {
            time: true,
            pages: false,
            score_threshold: None,
        }
    }
}

impl CompletionCriteria {
    /// Build from the form's checkbox values; nothing selected means time.
    pub fn from_form(selected: &[String], threshold: Option<&str>) -> Result<Self> {
        let has = |name: &str| selected.iter().any(|s| s.trim().eq_ignore_ascii_case(name));
        let time = has("time") || has("temps");
        let pages = has("pages");
        let score_threshold = if has("score") {
            Some(parse_threshold(threshold)?)
        } else {
            None
        };

        if !time && !pages && score_threshold.is_none() {
            return Ok(Self::default());
        }
        Ok(Self {
            time,
            pages,
            score_threshold,
        })
    }

    /// Page-tracking only makes sense for a PDF.
    pub fn for_kind(self, kind: Option<MediaKind>) -> Self {
        let mut c = self;
        if kind != Some(MediaKind::Pdf) {
            c.pages = false;
        }
        if !matches!(kind, Some(MediaKind::Pdf | MediaKind::Audio | MediaKind::Video)) {
            c.score_threshold = None;
        }
        if !c.time && !c.pages && c.score_threshold.is_none() {
            c.time = true;
        }
        c
    }
}

fn parse_threshold(raw: Option<&str>) -> Result<u8> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_SCORE_THRESHOLD);
    };
    match raw.parse::<u8>() {
        Ok(v) if (1..=100).contains(&v) => Ok(v),
        _ => Err(PackError::InvalidThreshold(raw.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub allow_print: bool,
    pub allow_download: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
    pub file_name: String,
    pub lang: String,
    pub vtt: String,
}

#[derive(Debug, Clone)]
pub struct PackagingOptions {
    pub title: String,
    pub version: ScormVersion,
    pub duration_secs: u32,
    pub criteria: CompletionCriteria,
    pub permissions: Permissions,
    pub subtitles: Vec<SubtitleTrack>,
}

impl PackagingOptions {
    pub fn new(title: impl Into<String>, version: ScormVersion, duration_secs: u32) -> Self {
        Self {
            title: title.into(),
            version,
            duration_secs,
            criteria: CompletionCriteria::default(),
            permissions: Permissions::default(),
            subtitles: Vec::new(),
        }
    }
}

/// The finished archive; the scratch directory it was built in is already gone.
#[derive(Debug, Clone)]
pub struct CoursePackage {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub files: Vec<String>,
}

/// What the inspect endpoint reports about an uploaded package.
#[derive(Serialize, Debug, Clone)]
pub struct PackageSummary {
    pub title: Option<String>,
    pub schema_version: Option<String>,
    pub launch_href: String,
    pub scos: Vec<ScoSummary>,
    pub files: Vec<String>,
    pub missing_files: Vec<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ScoSummary {
    pub identifier: String,
    pub href: String,
    pub parameters: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kinds_and_payload_names() {
        let pdf = SourceMedia::new("Cours.PDF", vec![]);
        assert_eq!(pdf.kind(), MediaKind::Pdf);
        assert_eq!(pdf.payload_name(), "document.pdf");

        let mp4 = SourceMedia::new("talk.mp4", vec![]);
        assert_eq!(mp4.kind(), MediaKind::Video);
        assert_eq!(mp4.payload_name(), "video/video.mp4");

        let mp3 = SourceMedia::new("my podcast.mp3", vec![]);
        assert_eq!(mp3.kind(), MediaKind::Audio);
        assert_eq!(mp3.payload_name(), "media/my_podcast.mp3");

        let docx = SourceMedia::new("notes.docx", vec![]);
        assert_eq!(docx.kind(), MediaKind::Document);
        assert_eq!(docx.payload_name(), "media/notes.docx");

        let page = SourceMedia::new("index.html", vec![]);
        assert_eq!(page.kind(), MediaKind::Document);
        assert_eq!(page.payload_name(), "media/index.html");
    }

    #[test]
    fn empty_selection_means_time() {
        let c = CompletionCriteria::from_form(&[], None).unwrap();
        assert_eq!(c, CompletionCriteria::default());
    }

    #[test]
    fn score_uses_default_threshold() {
        let c = CompletionCriteria::from_form(&["score".to_string()], Some("")).unwrap();
        assert!(!c.time);
        assert_eq!(c.score_threshold, Some(DEFAULT_SCORE_THRESHOLD));

        let c = CompletionCriteria::from_form(&["pages".to_string(), "score".to_string()], Some("50"))
            .unwrap();
        assert!(c.pages);
        assert_eq!(c.score_threshold, Some(50));
    }

    #[test]
    fn threshold_is_bounded() {
        for bad in ["0", "101", "abc", "-5"] {
            assert!(matches!(
                CompletionCriteria::from_form(&["score".to_string()], Some(bad)),
                Err(PackError::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn pages_dropped_outside_pdf() {
        let c = CompletionCriteria {
            time: false,
            pages: true,
            score_threshold: None,
        };
        assert_eq!(c.for_kind(Some(MediaKind::Pdf)), c);
        let audio = c.for_kind(Some(MediaKind::Audio));
        assert!(!audio.pages);
        assert!(audio.time);

        let scored = CompletionCriteria {
            time: false,
            pages: false,
            score_threshold: Some(90),
        };
        assert_eq!(scored.for_kind(Some(MediaKind::Video)), scored);
        assert!(scored.for_kind(None).time);
        assert_eq!(scored.for_kind(Some(MediaKind::Document)).score_threshold, None);
    }
}
