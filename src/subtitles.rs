//! SRT <-> WebVTT conversion and subtitle track preparation.

use crate::{
    error::{PackError, Result},
    models::SubtitleTrack,
    util,
};

const VTT_HEADER: &str = "WEBVTT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    Vtt,
}

impl SubtitleFormat {
    pub fn from_file_name(name: &str) -> Result<Self> {
        match util::extension(name).as_deref() {
            Some("srt") => Ok(Self::Srt),
            Some("vtt") => Ok(Self::Vtt),
            _ => Err(PackError::UnsupportedSubtitle(name.to_string())),
        }
    }
}

fn is_cue_timing(line: &str) -> bool {
    line.contains("-->")
}

pub fn srt_to_vtt(srt: &str) -> String {
    let srt = srt.trim_start_matches('\u{feff}');
    let mut out = String::with_capacity(srt.len() + 8);
    out.push_str(VTT_HEADER);
    out.push_str("\n\n");
    for line in srt.lines() {
        if is_cue_timing(line) {
            out.push_str(&line.replace(',', "."));
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

pub fn vtt_to_srt(vtt: &str) -> String {
    let vtt = vtt.trim_start_matches('\u{feff}');
    let mut out = String::with_capacity(vtt.len());
    let mut in_header = true;
    for line in vtt.lines() {
        if in_header {
            let t = line.trim();
            if t.is_empty() || t.starts_with(VTT_HEADER) {
                continue;
            }
            in_header = false;
        }
        if is_cue_timing(line) {
            out.push_str(&line.replace('.', ","));
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Language code from a `name_xx.ext` style file name.
pub fn language_from_filename(name: &str) -> Option<String> {
    let stem = util::file_stem(name);
    let (_, code) = stem.rsplit_once('_')?;
    let valid = (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic());
    valid.then(|| code.to_ascii_lowercase())
}

// Tags end up in file names, so only letters, digits and `-` pass.
fn is_language_tag(tag: &str) -> bool {
    (2..=8).contains(&tag.len()) && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Display label for a `<track>`; unknown codes fall back to the code itself.
pub fn language_label(code: &str) -> String {
    let label = match code {
        "en" => "English",
        "fr" => "Français",
        "de" => "Deutsch",
        "es" => "Español",
        "it" => "Italiano",
        "pt" => "Português",
        "nl" => "Nederlands",
        "ar" => "العربية",
        "zh" => "中文",
        "ja" => "日本語",
        "ru" => "Русский",
        _ => return code.to_string(),
    };
    label.to_string()
}

/// Turn an uploaded subtitle file into a WebVTT track named `<stem>_<lang>.vtt`.
pub fn prepare_track(name: &str, bytes: &[u8], lang: Option<&str>) -> Result<SubtitleTrack> {
    let format = SubtitleFormat::from_file_name(name)?;
    let text =
        std::str::from_utf8(bytes).map_err(|_| PackError::SubtitleEncoding(name.to_string()))?;

    let safe = util::sanitize_file_name(name);
    let stem = util::file_stem(&safe);
    let lang = lang
        .map(str::trim)
        .filter(|l| is_language_tag(l))
        .map(str::to_ascii_lowercase)
        .or_else(|| language_from_filename(&safe))
        .unwrap_or_else(|| "en".to_string());

    let suffix = format!("_{lang}");
    let file_name = if stem.ends_with(&suffix) {
        format!("{stem}.vtt")
    } else {
        format!("{stem}{suffix}.vtt")
    };

    let vtt = match format {
        SubtitleFormat::Srt => srt_to_vtt(text),
        SubtitleFormat::Vtt => text.to_string(),
    };
    Ok(SubtitleTrack {
        file_name,
        lang,
        vtt,
    })
}
