use percent_encoding::percent_decode_str;
use std::{
    fs,
    io::{Cursor, Write},
    path::{Component, Path, PathBuf},
};
use uuid::Uuid;
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::{
    error::{PackError, Result},
    manifest::{self, ExtractLimits, ManifestParams, MANIFEST_FILE},
    models::{CoursePackage, CourseSource, PackageSummary, PackagingOptions, ScoSummary},
    util,
    viewer::{self, ViewerMedia, ViewerParams, INDEX_FILE},
};

/// Per-request working directory, removed when dropped.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(root: &Path) -> Result<Self> {
        let path = root.join(format!("pkg-{}", Uuid::new_v4()));
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn write(&self, rel: &str, contents: &[u8]) -> Result<()> {
        let target = self.path.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, contents)?;
        tracing::debug!(file = rel, bytes = contents.len(), "wrote package file");
        Ok(())
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch dir");
        }
    }
}

#[derive(Debug, Clone)]
pub struct Packager {
    scratch_root: PathBuf,
    limits: ExtractLimits,
}

impl Packager {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            limits: ExtractLimits::default(),
        }
    }

    pub fn with_extract_limits(mut self, limits: ExtractLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    pub fn build(&self, source: &CourseSource, opts: &PackagingOptions) -> Result<CoursePackage> {
        let dir = ScratchDir::create(&self.scratch_root)?;
        let mut files = vec![INDEX_FILE.to_string()];

        let payload = match source {
            CourseSource::Upload(m) => m.payload_name(),
            CourseSource::Remote { .. } => String::new(),
        };
        if let CourseSource::Upload(m) = source {
            dir.write(&payload, &m.bytes)?;
            files.push(payload.clone());
        }

        for track in &opts.subtitles {
            dir.write(&track.file_name, track.vtt.as_bytes())?;
            // a repeated track name replaces the earlier file
            if !files.contains(&track.file_name) {
                files.push(track.file_name.clone());
            }
        }

        let viewer_media = match source {
            CourseSource::Upload(m) => ViewerMedia::File {
                kind: m.kind(),
                payload: &payload,
            },
            CourseSource::Remote { url } => ViewerMedia::Remote { url },
        };

        let rendered = viewer::render_viewer(&ViewerParams {
            title: &opts.title,
            version: opts.version,
            media: viewer_media,
            duration_secs: opts.duration_secs,
            criteria: opts.criteria,
            permissions: opts.permissions,
            tracks: &opts.subtitles,
        })?;

        dir.write(INDEX_FILE, rendered.index_html.as_bytes())?;
        for (rel, js) in &rendered.scripts {
            dir.write(rel, js.as_bytes())?;
            files.push(rel.clone());
        }

        let identifier = format!("rustiscorm-{}", Uuid::new_v4());
        let manifest_xml = manifest::render_manifest(&ManifestParams {
            version: opts.version,
            identifier: &identifier,
            title: &opts.title,
            launch: INDEX_FILE,
            files: &files,
        });
        dir.write(MANIFEST_FILE, manifest_xml.as_bytes())?;

        verify_package(&dir.path)?;
        let bytes = zip_dir(&dir.path)?;

        let file_name = format!("{}.zip", util::slugify(&opts.title));
        tracing::info!(
            archive = %file_name,
            version = opts.version.label(),
            files = files.len(),
            bytes = bytes.len(),
            "built SCORM package"
        );
        Ok(CoursePackage {
            file_name,
            bytes,
            files,
        })
    }
}

impl Packager {
    /// Unpack an existing SCORM archive and report what its manifest declares.
    pub fn inspect(&self, zip_bytes: &[u8]) -> Result<PackageSummary> {
        let dir = ScratchDir::create(&self.scratch_root)?;
        manifest::extract_zip_to_dir(zip_bytes, &dir.path, self.limits).map_err(|e| match e {
            PackError::Zip(z) => PackError::InvalidArchive(z.to_string()),
            other => other,
        })?;
        let mf_path = manifest::find_manifest(&dir.path)?;
        let xml = fs::read_to_string(&mf_path)?;
        let parsed = manifest::read_manifest(&xml)?;

        let base = mf_path.parent().unwrap_or(dir.path.as_path());
        let missing = missing_files(base, &parsed.files);
        tracing::info!(
            launch = %parsed.default_launch,
            scos = parsed.scos.len(),
            missing = missing.len(),
            "inspected package"
        );

        Ok(PackageSummary {
            title: parsed.title,
            schema_version: parsed.schema_version,
            launch_href: parsed.default_launch,
            scos: parsed
                .scos
                .into_iter()
                .map(|(identifier, href, parameters)| ScoSummary {
                    identifier,
                    href,
                    parameters,
                })
                .collect(),
            files: parsed.files,
            missing_files: missing,
        })
    }
}

/// Every `<file href>` in the manifest must exist in `dir`, and the launch
/// page must sit next to the manifest.
pub fn verify_package(dir: &Path) -> Result<()> {
    let xml = fs::read_to_string(dir.join(MANIFEST_FILE))
        .map_err(|_| PackError::MissingPayloadFile(MANIFEST_FILE.to_string()))?;
    let parsed = manifest::read_manifest(&xml)?;

    let required = std::iter::once(&parsed.default_launch).chain(parsed.files.iter());
    for href in required {
        if !resolve_href(dir, href).is_some_and(|p| p.is_file()) {
            return Err(PackError::MissingPayloadFile(href.clone()));
        }
    }
    Ok(())
}

/// Map a manifest href to a path inside `dir`. Absolute hrefs and hrefs that
/// climb out of the package resolve to `None`.
fn resolve_href(dir: &Path, href: &str) -> Option<PathBuf> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let rel = Path::new(decoded.as_ref());
    let mut parts = rel.components().filter(|c| *c != Component::CurDir).peekable();
    parts.peek()?;
    if !parts.all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(dir.join(rel))
}

/// Hrefs listed in a manifest that are absent from the extracted package.
/// Hrefs pointing outside the package always count as absent.
pub fn missing_files(dir: &Path, files: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|href| {
            !href.contains("://") && !resolve_href(dir, href).is_some_and(|p| p.is_file())
        })
        .cloned()
        .collect()
}

pub fn zip_dir(dir: &Path) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let entries = WalkDir::new(dir).min_depth(1).sort_by_file_name();
    for entry in entries {
        let entry = entry.map_err(|e| PackError::Io(e.into()))?;
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| PackError::Task(e.to_string()))?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else {
            zip.start_file(name, options)?;
            zip.write_all(&fs::read(entry.path())?)?;
        }
    }
    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{CompletionCriteria, Permissions, SourceMedia, SubtitleTrack},
        runtime::ScormVersion,
    };
    use std::collections::BTreeSet;
    use std::io::Read;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("rustiscorm-test-{}", Uuid::new_v4()))
    }

    fn unzip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .filter_map(|i| {
                let mut f = archive.by_index(i).unwrap();
                if f.is_dir() {
                    return None;
                }
                let mut buf = Vec::new();
                f.read_to_end(&mut buf).unwrap();
                Some((f.name().to_string(), buf))
            })
            .collect()
    }

    fn text(entries: &[(String, Vec<u8>)], name: &str) -> String {
        let (_, body) = entries.iter().find(|(n, _)| n == name).unwrap();
        String::from_utf8(body.clone()).unwrap()
    }

    #[test]
    fn pdf_package_end_to_end() {
        let root = scratch_root();
        let packager = Packager::new(&root);
        let source = CourseSource::Upload(SourceMedia::new("intro.pdf", b"%PDF-1.4 three pages".to_vec()));
        let opts = PackagingOptions::new("Intro", ScormVersion::V1_2, 10);

        let pkg = packager.build(&source, &opts).unwrap();
        assert_eq!(pkg.file_name, "Intro.zip");
        assert_eq!(pkg.files, vec!["index.html", "document.pdf"]);

        let entries = unzip(&pkg.bytes);
        let names: BTreeSet<_> = entries.iter().map(|(n, _)| n.clone()).collect();
        assert!(names.contains("imsmanifest.xml"));
        assert!(names.contains("index.html"));

        let index = text(&entries, "index.html");
        assert!(index.contains("let remaining = 10;"));

        let mf = manifest::read_manifest(&text(&entries, "imsmanifest.xml")).unwrap();
        assert_eq!(mf.schema_version.as_deref(), Some("1.2"));
        for href in &mf.files {
            assert!(names.contains(href), "{href} missing from archive");
        }

        let (_, pdf) = entries.iter().find(|(n, _)| n == "document.pdf").unwrap();
        assert_eq!(pdf.as_slice(), b"%PDF-1.4 three pages");

        // scratch dir is gone, only the empty root remains
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn video_package_with_subtitles() {
        let root = scratch_root();
        let packager = Packager::new(&root);
        let source = CourseSource::Upload(SourceMedia::new("talk.mp4", vec![0, 1, 2]));
        let mut opts = PackagingOptions::new("Talk", ScormVersion::V2004, 60);
        opts.criteria = CompletionCriteria {
            time: false,
            pages: false,
            score_threshold: Some(80),
        };
        opts.subtitles.push(SubtitleTrack {
            file_name: "talk_fr.vtt".into(),
            lang: "fr".into(),
            vtt: "WEBVTT\n\n".into(),
        });

        let pkg = packager.build(&source, &opts).unwrap();
        let entries = unzip(&pkg.bytes);
        let names: BTreeSet<_> = entries.iter().map(|(n, _)| n.clone()).collect();
        assert!(names.contains("video/video.mp4"));
        assert!(names.contains("talk_fr.vtt"));

        let mf = manifest::read_manifest(&text(&entries, "imsmanifest.xml")).unwrap();
        assert_eq!(mf.schema_version.as_deref(), Some("2004 3rd Edition"));
        let listed: BTreeSet<_> = mf.files.iter().cloned().collect();
        let expected: BTreeSet<_> = pkg.files.iter().cloned().collect();
        assert_eq!(listed, expected);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn pdf_page_tracker_ships_viewer_js() {
        let root = scratch_root();
        let packager = Packager::new(&root);
        let source = CourseSource::Upload(SourceMedia::new("deck.pdf", b"%PDF".to_vec()));
        let mut opts = PackagingOptions::new("Deck", ScormVersion::V1_2, 0);
        opts.criteria = CompletionCriteria {
            time: true,
            pages: true,
            score_threshold: None,
        };
        opts.permissions = Permissions {
            allow_print: false,
            allow_download: true,
        };

        let pkg = packager.build(&source, &opts).unwrap();
        assert!(pkg.files.contains(&"viewer.js".to_string()));
        let entries = unzip(&pkg.bytes);
        assert!(entries.iter().any(|(n, _)| n == "viewer.js"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn remote_package_ships_wrapper() {
        let root = scratch_root();
        let packager = Packager::new(&root);
        let source = CourseSource::Remote {
            url: "https://www.youtube.com/watch?v=abc".into(),
        };
        let opts = PackagingOptions::new("Remote", ScormVersion::V1_2, 120);

        let pkg = packager.build(&source, &opts).unwrap();
        assert_eq!(pkg.files, vec!["index.html", "js/wrapper.js"]);
        let entries = unzip(&pkg.bytes);
        assert!(entries.iter().any(|(n, _)| n == "js/wrapper.js"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn failed_build_cleans_up() {
        let root = scratch_root();
        let packager = Packager::new(&root);
        let source = CourseSource::Remote {
            url: "ftp://example.com/v.mp4".into(),
        };
        let opts = PackagingOptions::new("Bad", ScormVersion::V1_2, 10);

        assert!(matches!(
            packager.build(&source, &opts),
            Err(PackError::InvalidRemoteUrl(_))
        ));
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn verify_reports_missing_payload() {
        let dir = scratch_root();
        fs::create_dir_all(&dir).unwrap();
        let files = vec!["index.html".to_string(), "gone.pdf".to_string()];
        let xml = manifest::render_manifest(&ManifestParams {
            version: ScormVersion::V1_2,
            identifier: "t",
            title: "t",
            launch: "index.html",
            files: &files,
        });
        fs::write(dir.join(MANIFEST_FILE), xml).unwrap();
        fs::write(dir.join("index.html"), "<html></html>").unwrap();

        assert!(matches!(
            verify_package(&dir),
            Err(PackError::MissingPayloadFile(f)) if f == "gone.pdf"
        ));
        assert_eq!(missing_files(&dir, &files), vec!["gone.pdf".to_string()]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn scorm2004_package_counts_down() {
        let root = scratch_root();
        let packager = Packager::new(&root);
        let source = CourseSource::Upload(SourceMedia::new("brief.pdf", b"%PDF".to_vec()));
        let opts = PackagingOptions::new("Brief", ScormVersion::V2004, 90);

        let pkg = packager.build(&source, &opts).unwrap();
        let entries = unzip(&pkg.bytes);
        let index = text(&entries, "index.html");
        assert!(index.contains("let remaining = 90;"));
        assert!(index.contains(r#"data-seconds="90">Time remaining: 00:01:30"#));
        assert!(index.contains("API_1484_11"));
        assert!(index.contains(r#"api.SetValue("cmi.completion_status", "completed")"#));
        assert!(!index.contains("LMSInitialize"));

        let mf = manifest::read_manifest(&text(&entries, "imsmanifest.xml")).unwrap();
        assert_eq!(mf.schema_version.as_deref(), Some("2004 3rd Edition"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn document_named_like_generated_file_is_kept() {
        let root = scratch_root();
        let packager = Packager::new(&root);
        let opts = PackagingOptions::new("Lesson", ScormVersion::V1_2, 10);

        let source = CourseSource::Upload(SourceMedia::new("index.html", b"<p>MY LESSON</p>".to_vec()));
        let pkg = packager.build(&source, &opts).unwrap();
        assert_eq!(pkg.files, vec!["index.html", "media/index.html"]);

        let entries = unzip(&pkg.bytes);
        assert_eq!(text(&entries, "media/index.html"), "<p>MY LESSON</p>");
        let index = text(&entries, "index.html");
        assert!(index.contains(r#"src="media/index.html""#));
        assert!(!index.contains("MY LESSON"));

        let source = CourseSource::Upload(SourceMedia::new(MANIFEST_FILE, b"<mine/>".to_vec()));
        let pkg = packager.build(&source, &opts).unwrap();
        let entries = unzip(&pkg.bytes);
        assert_eq!(text(&entries, "media/imsmanifest.xml"), "<mine/>");
        assert!(manifest::read_manifest(&text(&entries, MANIFEST_FILE)).is_ok());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn repeated_subtitle_name_listed_once() {
        let root = scratch_root();
        let packager = Packager::new(&root);
        let source = CourseSource::Upload(SourceMedia::new("talk.mp4", vec![0]));
        let mut opts = PackagingOptions::new("Talk", ScormVersion::V1_2, 10);
        for body in ["WEBVTT\n\none", "WEBVTT\n\ntwo"] {
            opts.subtitles.push(SubtitleTrack {
                file_name: "talk_en.vtt".into(),
                lang: "en".into(),
                vtt: body.into(),
            });
        }

        let pkg = packager.build(&source, &opts).unwrap();
        assert_eq!(pkg.files.iter().filter(|f| *f == "talk_en.vtt").count(), 1);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn hrefs_outside_package_count_as_missing() {
        let dir = scratch_root();
        fs::create_dir_all(dir.join("media")).unwrap();
        fs::write(dir.join("media").join("my notes.txt"), "x").unwrap();
        fs::write(dir.join("index.html"), "x").unwrap();
        let outside = dir.join("index.html").display().to_string();

        let files: Vec<String> = [
            "/etc/passwd",
            "../../../../etc/hostname",
            "media/../../outside.txt",
            outside.as_str(),
            "media/my%20notes.txt",
            "./index.html",
            "https://cdn.example.com/lib.js",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(
            missing_files(&dir, &files),
            vec![
                "/etc/passwd".to_string(),
                "../../../../etc/hostname".to_string(),
                "media/../../outside.txt".to_string(),
                outside,
            ]
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn inspect_never_looks_outside_package() {
        let root = scratch_root();
        let src = root.join("src");
        fs::create_dir_all(&src).unwrap();
        let files = vec![
            "index.html".to_string(),
            "/etc/passwd".to_string(),
            "../../../../etc/hostname".to_string(),
        ];
        let xml = manifest::render_manifest(&ManifestParams {
            version: ScormVersion::V1_2,
            identifier: "t",
            title: "t",
            launch: "index.html",
            files: &files,
        });
        fs::write(src.join(MANIFEST_FILE), xml).unwrap();
        fs::write(src.join("index.html"), "<html></html>").unwrap();
        let bytes = zip_dir(&src).unwrap();

        let summary = Packager::new(root.join("scratch")).inspect(&bytes).unwrap();
        assert_eq!(summary.missing_files, files[1..].to_vec());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn inspect_rejects_oversized_archive() {
        let root = scratch_root();
        let src = root.join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("index.html"), vec![b'a'; 4096]).unwrap();
        let bytes = zip_dir(&src).unwrap();

        let packager = Packager::new(root.join("scratch")).with_extract_limits(ExtractLimits {
            max_entries: 10,
            max_bytes: 1024,
        });
        assert!(matches!(
            packager.inspect(&bytes),
            Err(PackError::ArchiveTooLarge(_))
        ));
        assert_eq!(fs::read_dir(root.join("scratch")).unwrap().count(), 0);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn inspect_round_trips_built_package() {
        let root = scratch_root();
        let packager = Packager::new(&root);
        let source = CourseSource::Upload(SourceMedia::new("song.mp3", vec![9; 32]));
        let opts = PackagingOptions::new("Song & Dance", ScormVersion::V2004, 30);
        let pkg = packager.build(&source, &opts).unwrap();

        let summary = packager.inspect(&pkg.bytes).unwrap();
        assert_eq!(summary.title.as_deref(), Some("Song & Dance"));
        assert_eq!(summary.schema_version.as_deref(), Some("2004 3rd Edition"));
        assert_eq!(summary.launch_href, "index.html");
        assert_eq!(summary.scos.len(), 1);
        assert_eq!(summary.files, vec!["index.html", "media/song.mp3"]);
        assert!(summary.missing_files.is_empty());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn inspect_rejects_archive_without_manifest() {
        let root = scratch_root();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src").join("index.html"), "<html></html>").unwrap();
        let bytes = zip_dir(&root.join("src")).unwrap();

        let packager = Packager::new(root.join("scratch"));
        assert!(matches!(
            packager.inspect(&bytes),
            Err(PackError::Manifest(manifest::MfErr::Missing))
        ));
        fs::remove_dir_all(&root).unwrap();
    }
}
