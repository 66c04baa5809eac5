use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::{
    duration,
    error::{PackError, Result},
    models::{
        CompletionCriteria, CourseSource, PackageSummary, PackagingOptions, Permissions,
        SourceMedia, DEFAULT_DURATION, DEFAULT_TITLE,
    },
    package::Packager,
    runtime::ScormVersion,
    subtitles::{self, SubtitleFormat},
    util, xliff,
};

pub fn router(packager: Packager) -> Router {
    Router::new()
        .route("/", get(upload_form))
        .route("/health", get(|| async { "ok" }))
        .route("/api/packages", post(create_package))
        .route("/api/packages/inspect", post(inspect_package))
        .route("/api/subtitles/convert", post(convert_subtitles))
        .route("/api/xliff/convert", post(convert_xliff))
        .with_state(packager)
}

async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

/// Raw multipart fields of the packaging form.
#[derive(Default, Debug)]
struct PackageForm {
    title: Option<String>,
    version: Option<String>,
    duration: Option<String>,
    criteria: Vec<String>,
    score_threshold: Option<String>,
    allow_print: bool,
    allow_download: bool,
    file: Option<SourceMedia>,
    video_url: Option<String>,
    subtitles: Vec<(String, Vec<u8>)>,
    subtitle_langs: Vec<String>,
}

fn checked(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "on" | "true" | "1" | "yes")
}

impl PackageForm {
    async fn read(mut mp: Multipart) -> Result<Self> {
        let mut form = Self::default();
        while let Some(field) = mp.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" | "subtitle" => {
                    let file_name = field.file_name().unwrap_or("").to_string();
                    let bytes = field.bytes().await?.to_vec();
                    // browsers submit an empty part when no file was chosen
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    if name == "file" {
                        form.file = Some(SourceMedia::new(file_name, bytes));
                    } else {
                        form.subtitles.push((file_name, bytes));
                    }
                }
                "title" => form.title = Some(field.text().await?),
                "version" => form.version = Some(field.text().await?),
                "duration" => form.duration = Some(field.text().await?),
                "criteria" => form.criteria.push(field.text().await?),
                "score_threshold" => form.score_threshold = Some(field.text().await?),
                "allow_print" => form.allow_print = checked(&field.text().await?),
                "allow_download" => form.allow_download = checked(&field.text().await?),
                "video_url" => form.video_url = Some(field.text().await?),
                "subtitle_lang" => form.subtitle_langs.push(field.text().await?),
                other => tracing::debug!(field = other, "ignoring unknown form field"),
            }
        }
        Ok(form)
    }

    fn into_request(self) -> Result<(CourseSource, PackagingOptions)> {
        let source = match (self.file, self.video_url) {
            (Some(media), _) => CourseSource::Upload(media),
            (None, Some(url)) if !url.trim().is_empty() => CourseSource::Remote {
                url: url.trim().to_string(),
            },
            _ => return Err(PackError::MissingUpload),
        };

        let version = ScormVersion::parse(self.version.as_deref().unwrap_or(""))?;
        let duration_secs = duration::parse_hms(
            self.duration.as_deref().map(str::trim).unwrap_or(DEFAULT_DURATION),
        )?;
        let criteria =
            CompletionCriteria::from_form(&self.criteria, self.score_threshold.as_deref())?;

        let subtitles = self
            .subtitles
            .iter()
            .enumerate()
            .map(|(i, (name, bytes))| {
                let lang = self.subtitle_langs.get(i).map(String::as_str);
                subtitles::prepare_track(name, bytes, lang)
            })
            .collect::<Result<Vec<_>>>()?;

        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let mut opts = PackagingOptions::new(title, version, duration_secs);
        opts.criteria = criteria;
        opts.permissions = Permissions {
            allow_print: self.allow_print,
            allow_download: self.allow_download,
        };
        opts.subtitles = subtitles;
        Ok((source, opts))
    }
}

fn attachment(content_type: &'static str, file_name: &str, body: impl IntoResponse) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, util::attachment_header(file_name)),
        ],
        body,
    )
        .into_response()
}

async fn create_package(State(packager): State<Packager>, mp: Multipart) -> Result<Response> {
    let (source, opts) = PackageForm::read(mp).await?.into_request()?;
    tracing::info!(
        title = %opts.title,
        version = opts.version.label(),
        seconds = opts.duration_secs,
        "packaging request"
    );

    let pkg = tokio::task::spawn_blocking(move || packager.build(&source, &opts))
        .await
        .map_err(|e| PackError::Task(e.to_string()))??;

    Ok(attachment("application/zip", &pkg.file_name, pkg.bytes))
}

async fn single_file(mut mp: Multipart) -> Result<(String, Vec<u8>)> {
    while let Some(field) = mp.next_field().await? {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or("").to_string();
            let bytes = field.bytes().await?.to_vec();
            if !bytes.is_empty() {
                return Ok((name, bytes));
            }
        }
    }
    Err(PackError::MissingUpload)
}

async fn inspect_package(
    State(packager): State<Packager>,
    mp: Multipart,
) -> Result<Json<PackageSummary>> {
    let (_, bytes) = single_file(mp).await?;
    let summary = tokio::task::spawn_blocking(move || packager.inspect(&bytes))
        .await
        .map_err(|e| PackError::Task(e.to_string()))??;
    Ok(Json(summary))
}

async fn convert_subtitles(mp: Multipart) -> Result<Response> {
    let (name, bytes) = single_file(mp).await?;
    let format = SubtitleFormat::from_file_name(&name)?;
    let text = String::from_utf8(bytes).map_err(|_| PackError::SubtitleEncoding(name.clone()))?;
    let stem = util::file_stem(&name);

    let resp = match format {
        SubtitleFormat::Srt => attachment(
            "text/vtt; charset=utf-8",
            &format!("{stem}.vtt"),
            subtitles::srt_to_vtt(&text),
        ),
        SubtitleFormat::Vtt => attachment(
            "application/x-subrip; charset=utf-8",
            &format!("{stem}.srt"),
            subtitles::vtt_to_srt(&text),
        ),
    };
    Ok(resp)
}

async fn convert_xliff(mp: Multipart) -> Result<Response> {
    let (name, bytes) = single_file(mp).await?;
    let converted = xliff::convert_12_to_21(&bytes)?;
    tracing::info!(file = %name, "converted XLIFF 1.2 to 2.1");
    Ok(attachment(
        "application/xml; charset=utf-8",
        &format!("{}_2.1.xliff", util::file_stem(&name)),
        converted,
    ))
}

const UPLOAD_FORM: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <title>SCORM packager</title>
  <style>
    body{font-family:Arial,sans-serif;max-width:720px;margin:2em auto;padding:0 1em}
    fieldset{margin-bottom:1em}
    label{display:block;margin:.4em 0}
    #error{color:#b00020;white-space:pre-wrap}
  </style>
</head>
<body>
<h1>Media to SCORM</h1>
<form id="pkg" method="post" action="/api/packages" enctype="multipart/form-data">
  <fieldset>
    <legend>Content</legend>
    <label>File (PDF, MP3, MP4, DOCX...) <input type="file" name="file"/></label>
    <label>or remote video URL <input type="url" name="video_url" placeholder="https://www.youtube.com/watch?v=..."/></label>
    <label>Subtitles (.srt/.vtt) <input type="file" name="subtitle" multiple accept=".srt,.vtt"/></label>
  </fieldset>
  <fieldset>
    <legend>Module</legend>
    <label>Title <input type="text" name="title" value="Module SCORM"/></label>
    <label>Minimum duration (HH:MM:SS) <input type="text" name="duration" value="00:05:00" pattern="\d{2}:[0-5]\d:[0-5]\d"/></label>
    <label>SCORM version
      <select name="version"><option value="1.2">1.2</option><option value="2004">2004</option></select>
    </label>
  </fieldset>
  <fieldset>
    <legend>Completion</legend>
    <label><input type="checkbox" name="criteria" value="time" checked/> Time elapsed</label>
    <label><input type="checkbox" name="criteria" value="pages"/> All pages read (PDF)</label>
    <label><input type="checkbox" name="criteria" value="score"/> Progress threshold
      <input type="number" name="score_threshold" min="1" max="100" value="80"/> %</label>
    <label><input type="checkbox" name="allow_print" value="on"/> Allow printing</label>
    <label><input type="checkbox" name="allow_download" value="on"/> Allow download</label>
  </fieldset>
  <button type="submit">Build package</button>
</form>
<p id="error"></p>
<h2>Converters</h2>
<form method="post" action="/api/subtitles/convert" enctype="multipart/form-data">
  <label>Subtitles (.srt to .vtt or back) <input type="file" name="file" accept=".srt,.vtt"/></label>
  <button type="submit">Convert</button>
</form>
<form method="post" action="/api/xliff/convert" enctype="multipart/form-data">
  <label>XLIFF 1.2 to 2.1 <input type="file" name="file" accept=".xliff,.xlf,.xml"/></label>
  <button type="submit">Convert</button>
</form>
<script>
document.getElementById("pkg").addEventListener("submit", async function (ev) {
  ev.preventDefault();
  var err = document.getElementById("error");
  err.textContent = "";
  var res = await fetch(this.action, { method: "POST", body: new FormData(this) });
  if (!res.ok) { err.textContent = await res.text(); return; }
  var name = "package.zip";
  var cd = res.headers.get("content-disposition") || "";
  var m = cd.match(/filename="([^"]+)"/);
  if (m) { name = m[1]; }
  var url = URL.createObjectURL(await res.blob());
  var a = document.createElement("a");
  a.href = url;
  a.download = name;
  a.click();
  URL.revokeObjectURL(url);
});
</script>
</body>
</html>
"#;
