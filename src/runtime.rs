// LMS runtime bindings for the two supported SCORM editions.

use crate::error::{PackError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScormVersion {
    V1_2,
    V2004,
}

impl ScormVersion {
    /// Accepts the labels the upload form and older tooling use.
    pub fn parse(raw: &str) -> Result<Self> {
        let v = raw.trim();
        let v = v.strip_prefix("SCORM").map(str::trim).unwrap_or(v);
        match v {
            "" => Err(PackError::MissingVersion),
            "1.2" => Ok(Self::V1_2),
            "2004" => Ok(Self::V2004),
            other => Err(PackError::UnknownVersion(other.to_string())),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::V1_2 => "1.2",
            Self::V2004 => "2004",
        }
    }

    /// Value of `<schemaversion>` in the manifest metadata.
    pub fn schema_version(self) -> &'static str {
        match self {
            Self::V1_2 => "1.2",
            Self::V2004 => "2004 3rd Edition",
        }
    }

    /// Name of the API object the LMS exposes on an ancestor window.
    pub fn api_object(self) -> &'static str {
        match self {
            Self::V1_2 => "API",
            Self::V2004 => "API_1484_11",
        }
    }

    pub fn status_element(self) -> &'static str {
        match self {
            Self::V1_2 => "cmi.core.lesson_status",
            Self::V2004 => "cmi.completion_status",
        }
    }

    pub fn score_raw_element(self) -> &'static str {
        match self {
            Self::V1_2 => "cmi.core.score.raw",
            Self::V2004 => "cmi.score.raw",
        }
    }

    fn calls(self) -> ApiCalls {
        match self {
            Self::V1_2 => ApiCalls {
                initialize: "LMSInitialize",
                get_value: "LMSGetValue",
                set_value: "LMSSetValue",
                commit: "LMSCommit",
                finish: "LMSFinish",
            },
            Self::V2004 => ApiCalls {
                initialize: "Initialize",
                get_value: "GetValue",
                set_value: "SetValue",
                commit: "Commit",
                finish: "Terminate",
            },
        }
    }
}

struct ApiCalls {
    initialize: &'static str,
    get_value: &'static str,
    set_value: &'static str,
    commit: &'static str,
    finish: &'static str,
}

/// Score bookkeeping beyond the raw value; 2004 also wants the scaled score.
fn score_extras(version: ScormVersion) -> String {
    let set = version.calls().set_value;
    match version {
        ScormVersion::V1_2 => format!(
            r#"api.{set}("cmi.core.score.min", "0");
      api.{set}("cmi.core.score.max", "100");"#
        ),
        ScormVersion::V2004 => format!(
            r#"api.{set}("cmi.score.min", "0");
      api.{set}("cmi.score.max", "100");
      api.{set}("cmi.score.scaled", String(Math.min(1, Math.max(0, score / 100))));"#
        ),
    }
}

/// JavaScript defining `ScormRuntime` with `init`, `complete(score?)` and
/// `finish`. `findAPI` walks at most ten ancestor windows, then tries the opener.
pub fn runtime_script(version: ScormVersion) -> String {
    let ApiCalls {
        initialize,
        get_value,
        set_value,
        commit,
        finish,
    } = version.calls();
    let api = version.api_object();
    let label = version.label();
    let status_el = version.status_element();
    let score_el = version.score_raw_element();
    let extras = score_extras(version);

    format!(
        r#"var ScormRuntime = (function () {{
  var api = null;
  var finished = false;

  function findAPI(win) {{
    var hops = 0;
    while (win && win.{api} == null && win.parent != null && win.parent != win) {{
      if (++hops > 10) {{ return null; }}
      win = win.parent;
    }}
    return win ? (win.{api} || null) : null;
  }}

  function locate() {{
    if (api) {{ return api; }}
    api = findAPI(window);
    if (!api && window.opener) {{ api = findAPI(window.opener); }}
    if (!api) {{ console.warn("SCORM {label} API not found"); }}
    return api;
  }}

  function init() {{
    if (!locate()) {{ return false; }}
    if (String(api.{initialize}("")) !== "true") {{
      console.error("{initialize} failed");
      return false;
    }}
    var status = api.{get_value}("{status_el}");
    if (status === "" || status === "not attempted" || status === "unknown") {{
      api.{set_value}("{status_el}", "incomplete");
      api.{commit}("");
    }}
    return true;
  }}

  function complete(score) {{
    if (!locate()) {{ return false; }}
    if (typeof score === "number") {{
      api.{set_value}("{score_el}", String(Math.round(score)));
      {extras}
    }}
    api.{set_value}("{status_el}", "completed");
    api.{commit}("");
    return true;
  }}

  function finish() {{
    if (!api || finished) {{ return; }}
    finished = true;
    api.{commit}("");
    api.{finish}("");
  }}

  window.addEventListener("beforeunload", finish);
  window.addEventListener("unload", finish);
  return {{ init: init, complete: complete, finish: finish }};
}})();
"#
    )
}
