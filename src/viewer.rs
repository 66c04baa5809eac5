// HTML/JS generation for the launch page of each package variant.

use crate::{
    duration::format_hms,
    error::{PackError, Result},
    models::{CompletionCriteria, MediaKind, Permissions, SubtitleTrack},
    runtime::{runtime_script, ScormVersion},
    subtitles::language_label,
    util::escape,
};

pub const INDEX_FILE: &str = "index.html";
pub const PDF_VIEWER_FILE: &str = "viewer.js";
pub const WRAPPER_FILE: &str = "js/wrapper.js";

const PDFJS_URL: &str = "https://cdnjs.cloudflare.com/ajax/libs/pdf.js/3.11.174/pdf.min.js";

#[derive(Debug, Clone, Copy)]
pub enum ViewerMedia<'a> {
    File { kind: MediaKind, payload: &'a str },
    Remote { url: &'a str },
}

#[derive(Debug, Clone)]
pub struct ViewerParams<'a> {
    pub title: &'a str,
    pub version: ScormVersion,
    pub media: ViewerMedia<'a>,
    pub duration_secs: u32,
    pub criteria: CompletionCriteria,
    pub permissions: Permissions,
    pub tracks: &'a [SubtitleTrack],
}

#[derive(Debug, Clone)]
pub struct RenderedViewer {
    pub index_html: String,
    /// Extra script files as (relative path, contents).
    pub scripts: Vec<(String, String)>,
}

pub fn render_viewer(params: &ViewerParams<'_>) -> Result<RenderedViewer> {
    let kind = match params.media {
        ViewerMedia::File { kind, .. } => Some(kind),
        ViewerMedia::Remote { .. } => None,
    };
    let criteria = params.criteria.for_kind(kind);

    let mut scripts = Vec::new();
    let mut head_scripts = String::new();
    let mut tail_scripts = String::new();

    let body = match params.media {
        ViewerMedia::File {
            kind: MediaKind::Pdf,
            payload,
        } if criteria.pages || criteria.score_threshold.is_some() => {
            head_scripts.push_str(&format!("  <script src=\"{PDFJS_URL}\"></script>\n"));
            tail_scripts.push_str(&format!("  <script src=\"{PDF_VIEWER_FILE}\"></script>\n"));
            scripts.push((PDF_VIEWER_FILE.to_string(), PDF_VIEWER_JS.to_string()));
            pdf_tracker_body(payload, params.permissions)
        }
        ViewerMedia::File {
            kind: MediaKind::Pdf,
            payload,
        } => pdf_embed_body(payload, params.permissions),
        ViewerMedia::File {
            kind: MediaKind::Audio,
            payload,
        } => {
            tail_scripts.push_str(&inline(&progress_script(false)));
            tail_scripts.push_str(&inline(SPECTRUM_JS));
            if !params.tracks.is_empty() {
                tail_scripts.push_str(&inline(TRACK_SELECT_JS));
            }
            audio_body(payload, params.tracks, params.permissions)
        }
        ViewerMedia::File {
            kind: MediaKind::Video,
            payload,
        } => {
            tail_scripts.push_str(&inline(&progress_script(true)));
            if !params.tracks.is_empty() {
                tail_scripts.push_str(&inline(TRACK_SELECT_JS));
            }
            video_body(payload, params.tracks, params.permissions)
        }
        ViewerMedia::File {
            kind: MediaKind::Document,
            payload,
        } => document_body(payload, params.permissions),
        ViewerMedia::Remote { url } => remote_body(&embed_url(url)?),
    };

    // remote packages keep the LMS calls in a separate wrapper file
    let runtime = runtime_script(params.version);
    if matches!(params.media, ViewerMedia::Remote { .. }) {
        head_scripts.push_str(&format!("  <script src=\"{WRAPPER_FILE}\"></script>\n"));
        scripts.push((WRAPPER_FILE.to_string(), runtime));
    } else {
        head_scripts.push_str(&inline(&runtime));
    }

    let timer = if criteria.time {
        format!(
            "  <div id=\"timer\" data-seconds=\"{secs}\">Time remaining: {hms}</div>\n",
            secs = params.duration_secs,
            hms = format_hms(params.duration_secs),
        )
    } else {
        String::new()
    };

    let mut scripts_after = inline(&completion_script(criteria));
    if criteria.time {
        scripts_after.push_str(&inline(&countdown_script(params.duration_secs)));
    }
    scripts_after.push_str(&tail_scripts);
    scripts_after.push_str(&inline(INIT_JS));

    let title = escape(params.title);
    let index_html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title}</title>
  <style>{css}</style>
{head_scripts}</head>
<body>
  <h1>{title}</h1>
{timer}{body}
  <p id="completion-message">This module is complete.</p>
{scripts_after}</body>
</html>
"#,
        css = BASE_CSS,
    );

    Ok(RenderedViewer {
        index_html,
        scripts,
    })
}

fn inline(js: &str) -> String {
    format!("  <script>\n{js}\n  </script>\n")
}

fn pdf_src(payload: &str, permissions: Permissions) -> String {
    if permissions.allow_print || permissions.allow_download {
        payload.to_string()
    } else {
        format!("{payload}#toolbar=0")
    }
}

fn download_link(payload: &str, permissions: Permissions) -> String {
    if permissions.allow_download {
        format!(
            "\n  <p><a class=\"download\" href=\"{href}\" download>Download</a></p>",
            href = escape(payload)
        )
    } else {
        String::new()
    }
}

fn pdf_embed_body(payload: &str, permissions: Permissions) -> String {
    format!(
        r#"  <embed id="document" src="{src}" type="application/pdf" width="100%" height="600px" />{link}"#,
        src = escape(&pdf_src(payload, permissions)),
        link = download_link(payload, permissions),
    )
}

fn pdf_tracker_body(payload: &str, permissions: Permissions) -> String {
    let print = if permissions.allow_print {
        "\n    <button id=\"pdf-print\" type=\"button\">Print</button>"
    } else {
        ""
    };
    format!(
        r#"  <div id="pdf-viewer" data-src="{src}" data-allow-download="{dl}">
    <div class="toolbar">
      <button id="pdf-prev" type="button">&larr;</button>
      <span id="page-label">&ndash;</span>
      <button id="pdf-next" type="button">&rarr;</button>{print}
    </div>
    <canvas id="pdf-canvas"></canvas>
  </div>{link}"#,
        src = escape(payload),
        dl = permissions.allow_download,
        link = download_link(payload, permissions),
    )
}

fn track_elements(tracks: &[SubtitleTrack]) -> String {
    tracks
        .iter()
        .enumerate()
        .map(|(i, t)| {
            format!(
                "\n      <track kind=\"subtitles\" src=\"{src}\" srclang=\"{lang}\" label=\"{label}\"{default} />",
                src = escape(&t.file_name),
                lang = escape(&t.lang),
                label = escape(&language_label(&t.lang)),
                default = if i == 0 { " default" } else { "" },
            )
        })
        .collect()
}

fn controls_list(permissions: Permissions) -> &'static str {
    if permissions.allow_download {
        ""
    } else {
        r#" controlsList="nodownload" oncontextmenu="return false;""#
    }
}

fn audio_body(payload: &str, tracks: &[SubtitleTrack], permissions: Permissions) -> String {
    // a <video> element so subtitle cues can be shown under the controls
    format!(
        r#"  <div id="player-container">
    <video id="player" class="audio" controls preload="metadata"{controls}>
      <source src="{src}" type="audio/mpeg" />{tracks}
      Your browser does not support audio playback.
    </video>
  </div>
  <canvas id="spectrum"></canvas>{link}"#,
        controls = controls_list(permissions),
        src = escape(payload),
        tracks = track_elements(tracks),
        link = download_link(payload, permissions),
    )
}

fn video_body(payload: &str, tracks: &[SubtitleTrack], permissions: Permissions) -> String {
    format!(
        r#"  <div id="player-container">
    <video id="player" controls crossorigin preload="metadata"{controls}>
      <source src="{src}" type="video/mp4" />{tracks}
      Your browser does not support video playback.
    </video>
  </div>{link}"#,
        controls = controls_list(permissions),
        src = escape(payload),
        tracks = track_elements(tracks),
        link = download_link(payload, permissions),
    )
}

fn document_body(payload: &str, permissions: Permissions) -> String {
    format!(
        r#"  <iframe id="document" src="{src}" width="100%" height="600px"></iframe>{link}"#,
        src = escape(payload),
        link = download_link(payload, permissions),
    )
}

fn remote_body(url: &str) -> String {
    format!(
        r#"  <div id="player-container">
    <iframe id="remote-player" src="{src}" width="100%" height="480px" allowfullscreen allow="autoplay; encrypted-media"></iframe>
  </div>"#,
        src = escape(url),
    )
}

/// Rewrite watch URLs of the common hosts into their embeddable form.
pub fn embed_url(url: &str) -> Result<String> {
    let url = url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(PackError::InvalidRemoteUrl(url.to_string()));
    }
    let id_until = |rest: &str| -> String {
        rest.split(['&', '?', '#', '/']).next().unwrap_or_default().to_string()
    };
    if let Some((_, rest)) = url.split_once("youtube.com/watch?v=") {
        return Ok(format!("https://www.youtube.com/embed/{}", id_until(rest)));
    }
    if let Some((_, rest)) = url.split_once("youtu.be/") {
        return Ok(format!("https://www.youtube.com/embed/{}", id_until(rest)));
    }
    if let Some((_, rest)) = url.split_once("://vimeo.com/") {
        return Ok(format!("https://player.vimeo.com/video/{}", id_until(rest)));
    }
    Ok(url.to_string())
}

/// The single completion flag: flips once when every enabled criterion holds.
fn completion_script(criteria: CompletionCriteria) -> String {
    let threshold = criteria
        .score_threshold
        .map(|t| t.to_string())
        .unwrap_or_else(|| "null".to_string());
    format!(
        r#"var Completion = (function () {{
  var requireTime = {time};
  var requirePages = {pages};
  var threshold = {threshold};
  var timeDone = !requireTime;
  var pagesDone = !requirePages;
  var progress = 0;
  var completed = false;

  function check() {{
    if (completed || !timeDone || !pagesDone) {{ return; }}
    if (threshold !== null && progress < threshold) {{ return; }}
    completed = true;
    ScormRuntime.complete(threshold !== null ? progress : undefined);
    var msg = document.getElementById("completion-message");
    if (msg) {{ msg.style.display = "block"; }}
  }}

  return {{
    timeElapsed: function () {{ timeDone = true; check(); }},
    allPagesViewed: function () {{ pagesDone = true; check(); }},
    progress: function (pct) {{ progress = Math.max(progress, Math.min(100, pct)); check(); }},
    isCompleted: function () {{ return completed; }}
  }};
}})();"#,
        time = criteria.time,
        pages = criteria.pages,
    )
}

/// Countdown with two states: running while `remaining > 0`, then expired.
fn countdown_script(seconds: u32) -> String {
    format!(
        r#"window.addEventListener("load", function () {{
  let remaining = {seconds};
  const timerDiv = document.getElementById("timer");
  function pad(n) {{ return String(n).padStart(2, "0"); }}
  function render() {{
    const h = Math.floor(remaining / 3600);
    const m = Math.floor((remaining % 3600) / 60);
    const s = remaining % 60;
    timerDiv.textContent = "Time remaining: " + pad(h) + ":" + pad(m) + ":" + pad(s);
  }}
  function expire() {{
    timerDiv.textContent = "Time elapsed";
    timerDiv.classList.add("expired");
    Completion.timeElapsed();
  }}
  if (remaining <= 0) {{ expire(); return; }}
  render();
  const timer = setInterval(function () {{
    remaining--;
    if (remaining > 0) {{
      render();
    }} else {{
      clearInterval(timer);
      expire();
    }}
  }}, 1000);
}});"#
    )
}

/// Played percentage of the `#player` element; with `guard_seek` the learner
/// cannot jump more than 0.75s past the furthest point already watched.
fn progress_script(guard_seek: bool) -> String {
    let advance = if guard_seek {
        r#"if (media.currentTime > maxPlayed + 0.75) {
      media.currentTime = maxPlayed;
      return;
    }
    maxPlayed = Math.max(maxPlayed, media.currentTime);"#
    } else {
        "maxPlayed = Math.max(maxPlayed, media.currentTime);"
    };
    format!(
        r#"(function () {{
  var media = document.getElementById("player");
  var maxPlayed = 0;
  media.addEventListener("timeupdate", function () {{
    if (!media.duration) {{ return; }}
    {advance}
    Completion.progress(maxPlayed / media.duration * 100);
  }});
  media.addEventListener("ended", function () {{
    maxPlayed = media.duration || maxPlayed;
    Completion.progress(100);
  }});
}})();"#
    )
}

const INIT_JS: &str = r#"window.addEventListener("load", function () { ScormRuntime.init(); });"#;

const TRACK_SELECT_JS: &str = r#"(function () {
  var media = document.getElementById("player");
  var lang = (navigator.language || "").slice(0, 2).toLowerCase();
  var tracks = media.textTracks;
  var chosen = -1;
  for (var i = 0; i < tracks.length; i++) {
    if (tracks[i].language === lang) { chosen = i; break; }
  }
  if (chosen === -1) {
    for (var j = 0; j < tracks.length; j++) {
      if (tracks[j].language === "en") { chosen = j; break; }
    }
  }
  if (chosen === -1 && tracks.length > 0) { chosen = 0; }
  for (var k = 0; k < tracks.length; k++) {
    tracks[k].mode = (k === chosen) ? "showing" : "disabled";
  }
})();"#;

const SPECTRUM_JS: &str = r#"(function () {
  var audio = document.getElementById("player");
  var canvas = document.getElementById("spectrum");
  var ctx = canvas.getContext("2d");
  var audioContext = null;
  var analyser = null;

  function setup() {
    audioContext = new (window.AudioContext || window.webkitAudioContext)();
    var source = audioContext.createMediaElementSource(audio);
    analyser = audioContext.createAnalyser();
    analyser.fftSize = 256;
    source.connect(analyser);
    analyser.connect(audioContext.destination);
  }

  function draw() {
    requestAnimationFrame(draw);
    canvas.width = canvas.clientWidth;
    canvas.height = canvas.clientHeight;
    var bins = analyser.frequencyBinCount;
    var data = new Uint8Array(bins);
    analyser.getByteFrequencyData(data);
    ctx.clearRect(0, 0, canvas.width, canvas.height);
    var barWidth = canvas.width / bins;
    for (var i = 0, x = 0; i < bins; i++, x += barWidth + 1) {
      var barHeight = data[i] / 255 * canvas.height;
      ctx.fillStyle = "rgb(" + Math.min(255, barHeight + 100) + "," + Math.floor(250 * i / bins) + ",50)";
      ctx.fillRect(x, canvas.height - barHeight, barWidth, barHeight);
    }
  }

  audio.addEventListener("play", function () {
    if (!audioContext) {
      setup();
      draw();
    }
    if (audioContext.state === "suspended") { audioContext.resume(); }
  });
})();"#;

/// Page tracker over pdf.js. Completion needs the set of viewed pages to
/// reach the page count; the score is the viewed share in percent.
const PDF_VIEWER_JS: &str = r#"(function () {
  var root = document.getElementById("pdf-viewer");
  var src = root.getAttribute("data-src");
  var allowDownload = root.getAttribute("data-allow-download") === "true";
  var canvas = document.getElementById("pdf-canvas");
  var ctx = canvas.getContext("2d");
  var label = document.getElementById("page-label");
  var viewed = new Set();
  var doc = null;
  var current = 1;
  var busy = false;

  pdfjsLib.GlobalWorkerOptions.workerSrc =
    "https://cdnjs.cloudflare.com/ajax/libs/pdf.js/3.11.174/pdf.worker.min.js";

  function report() {
    Completion.progress(viewed.size * 100 / doc.numPages);
    if (viewed.size === doc.numPages) { Completion.allPagesViewed(); }
  }

  function show(n) {
    if (!doc || busy || n < 1 || n > doc.numPages) { return; }
    busy = true;
    doc.getPage(n).then(function (page) {
      var viewport = page.getViewport({ scale: 1.4 });
      canvas.width = viewport.width;
      canvas.height = viewport.height;
      return page.render({ canvasContext: ctx, viewport: viewport }).promise;
    }).then(function () {
      current = n;
      label.textContent = n + " / " + doc.numPages;
      viewed.add(n);
      report();
    }).catch(function (e) {
      console.error("page render failed", e);
    }).then(function () {
      busy = false;
    });
  }

  document.getElementById("pdf-prev").addEventListener("click", function () { show(current - 1); });
  document.getElementById("pdf-next").addEventListener("click", function () { show(current + 1); });
  document.addEventListener("keydown", function (e) {
    if (e.key === "ArrowLeft") { show(current - 1); }
    if (e.key === "ArrowRight") { show(current + 1); }
  });

  var print = document.getElementById("pdf-print");
  if (print) {
    print.addEventListener("click", function () {
      var w = window.open(src);
      if (w) { w.addEventListener("load", function () { w.print(); }); }
    });
  }
  if (!allowDownload) {
    canvas.addEventListener("contextmenu", function (e) { e.preventDefault(); });
  }

  pdfjsLib.getDocument(src).promise.then(function (pdf) {
    doc = pdf;
    show(1);
  }).catch(function (e) {
    label.textContent = "Unable to load document";
    console.error(e);
  });
})();
"#;

const BASE_CSS: &str = r#"
    body { font-family: Arial, sans-serif; background: #222; color: #eee; margin: 0; padding: 20px; text-align: center; }
    h1 { margin-bottom: 16px; }
    #timer { font-size: 20px; font-weight: bold; color: #7bd389; margin-bottom: 10px; }
    #timer.expired { color: #4caf50; }
    #player-container { max-width: 800px; margin: 0 auto; }
    video { width: 100%; background: #000; }
    video.audio { height: 100px; }
    #spectrum { display: block; width: 80%; max-width: 600px; height: 150px; margin: 20px auto; background: #000; border: 1px solid #444; }
    embed, iframe { border: 1px solid #444; background: #fff; }
    #pdf-viewer .toolbar { margin-bottom: 8px; }
    #pdf-canvas { max-width: 100%; background: #fff; }
    #completion-message { display: none; margin-top: 20px; font-weight: bold; color: #4caf50; }
    a.download { color: #9ecbff; }
  "#;
