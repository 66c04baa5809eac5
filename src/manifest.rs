use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::{
    collections::HashMap,
    io::Read,
    path::{Path, PathBuf},
};
use thiserror::Error;
use walkdir::WalkDir;

use crate::{error::PackError, runtime::ScormVersion, util::escape};

pub const MANIFEST_FILE: &str = "imsmanifest.xml";

#[derive(Error, Debug)]
pub enum MfErr {
    #[error("imsmanifest.xml not found")]
    Missing,
    #[error("failed to parse manifest")]
    Parse,
    #[error("manifest has no launchable resource")]
    NoLaunch,
}

/// Inputs of a single-SCO manifest.
#[derive(Debug, Clone)]
pub struct ManifestParams<'a> {
    pub version: ScormVersion,
    pub identifier: &'a str,
    pub title: &'a str,
    pub launch: &'a str,
    pub files: &'a [String],
}

const HEADER_12: &str = r#"<manifest identifier="{id}" version="1.2"
  xmlns="http://www.imsproject.org/xsd/imscp_rootv1p1p2"
  xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_rootv1p2"
  xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
  xsi:schemaLocation="http://www.imsproject.org/xsd/imscp_rootv1p1p2 imscp_rootv1p1p2.xsd
                      http://www.adlnet.org/xsd/adlcp_rootv1p2 adlcp_rootv1p2.xsd">"#;

const HEADER_2004: &str = r#"<manifest identifier="{id}" version="1.0"
  xmlns="http://www.imsglobal.org/xsd/imscp_v1p1"
  xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_v1p3"
  xmlns:imsss="http://www.imsglobal.org/xsd/imsss"
  xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
  xsi:schemaLocation="http://www.imsglobal.org/xsd/imscp_v1p1 imscp_v1p1.xsd
                      http://www.adlnet.org/xsd/adlcp_v1p3 adlcp_v1p3.xsd
                      http://www.imsglobal.org/xsd/imsss imsss_v1p0.xsd">"#;

pub fn render_manifest(params: &ManifestParams<'_>) -> String {
    let id = escape(params.identifier);
    let title = escape(params.title);
    let launch = escape(params.launch);

    let (header, scorm_type_attr, item_attrs) = match params.version {
        ScormVersion::V1_2 => (HEADER_12, "adlcp:scormtype", ""),
        ScormVersion::V2004 => (HEADER_2004, "adlcp:scormType", r#" isvisible="true""#),
    };
    let header = header.replace("{id}", &id);

    let mut seen = std::collections::HashSet::new();
    let files: String = params
        .files
        .iter()
        .filter(|f| seen.insert(f.as_str()))
        .map(|f| format!("\n      <file href=\"{}\"/>", escape(f)))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
{header}
  <metadata>
    <schema>ADL SCORM</schema>
    <schemaversion>{schema_version}</schemaversion>
  </metadata>
  <organizations default="ORG1">
    <organization identifier="ORG1">
      <title>{title}</title>
      <item identifier="ITEM1" identifierref="RES1"{item_attrs}>
        <title>{title}</title>
      </item>
    </organization>
  </organizations>
  <resources>
    <resource identifier="RES1" type="webcontent" {scorm_type_attr}="sco" href="{launch}">{files}
    </resource>
  </resources>
</manifest>
"#,
        schema_version = params.version.schema_version(),
    )
}

#[derive(Debug, Clone)]
pub struct ParsedManifest {
    pub title: Option<String>,
    pub schema_version: Option<String>,
    pub default_launch: String,
    // (sco_identifier, href, parameters)
    pub scos: Vec<(String, String, Option<String>)>,
    /// Every `<file href>` across all resources, in document order.
    pub files: Vec<String>,
}

/// Caps applied while unpacking an uploaded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub max_entries: usize,
    pub max_bytes: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_bytes: 1 << 30,
        }
    }
}

impl ExtractLimits {
    /// Unpacked content may be at most four times the accepted upload size.
    pub fn for_upload(max_upload_bytes: usize) -> Self {
        Self {
            max_bytes: (max_upload_bytes as u64).saturating_mul(4),
            ..Self::default()
        }
    }
}

pub fn extract_zip_to_dir(
    bytes: &[u8],
    out_dir: &Path,
    limits: ExtractLimits,
) -> crate::error::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let reader = std::io::Cursor::new(bytes);
    let mut zip = zip::ZipArchive::new(reader)?;
    if zip.len() > limits.max_entries {
        return Err(PackError::ArchiveTooLarge(format!(
            "{} entries, at most {} allowed",
            zip.len(),
            limits.max_entries
        )));
    }
    let too_large = || {
        PackError::ArchiveTooLarge(format!("unpacks to more than {} bytes", limits.max_bytes))
    };

    let mut unpacked: u64 = 0;
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        // skip entries that would escape the target directory
        let Some(rel) = file.enclosed_name().map(Path::to_path_buf) else {
            tracing::warn!(entry = file.name(), "skipping unsafe zip entry");
            continue;
        };
        let outpath = out_dir.join(rel);
        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        let budget = limits.max_bytes - unpacked;
        if file.size() > budget {
            return Err(too_large());
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = std::fs::File::create(&outpath)?;
        // declared sizes can lie, so bound the stream itself too
        let mut bounded = file.by_ref().take(budget.saturating_add(1));
        unpacked += std::io::copy(&mut bounded, &mut outfile)?;
        if unpacked > limits.max_bytes {
            return Err(too_large());
        }
    }
    Ok(())
}

/// Locate the shallowest `imsmanifest.xml` under `dir`.
pub fn find_manifest(dir: &Path) -> Result<PathBuf, MfErr> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == MANIFEST_FILE)
        .min_by_key(|e| e.depth())
        .map(|e| e.path().to_path_buf())
        .ok_or(MfErr::Missing)
}

#[derive(Default, Debug, Clone)]
struct ResourceInfo {
    href: Option<String>,
    files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TextTarget {
    OrgTitle,
    SchemaVersion,
}

pub fn read_manifest(xml: &str) -> Result<ParsedManifest, MfErr> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();

    let mut resources: HashMap<String, ResourceInfo> = HashMap::new();
    // every file in document order, independent of resource bookkeeping
    let mut files: Vec<String> = Vec::new();
    // (identifier, identifierref, parameters)
    let mut items: Vec<(String, String, Option<String>)> = Vec::new();

    let mut current_res_id: Option<String> = None;
    let mut default_org_id: Option<String> = None;
    let mut current_org_id: Option<String> = None;
    let mut first_item_ref_in_default_org: Option<String> = None;
    let mut first_item_ref_any: Option<String> = None;

    let mut title: Option<String> = None;
    let mut schema_version: Option<String> = None;
    let mut text_target: Option<TextTarget> = None;
    let mut depth_in_item = 0usize;
    let mut saw_manifest = false;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|_| MfErr::Parse)?;
        match event {
            Event::Start(e) => {
                let name = local_name(&e);
                match name.as_str() {
                    "manifest" => saw_manifest = true,
                    "organizations" => default_org_id = get_attr(&e, "default"),
                    "organization" => current_org_id = get_attr(&e, "identifier"),
                    "item" => {
                        depth_in_item += 1;
                        on_item(
                            &e,
                            &default_org_id,
                            &current_org_id,
                            &mut items,
                            &mut first_item_ref_in_default_org,
                            &mut first_item_ref_any,
                        );
                    }
                    "title" if current_org_id.is_some() && depth_in_item == 0 && title.is_none() => {
                        text_target = Some(TextTarget::OrgTitle);
                    }
                    "schemaversion" => text_target = Some(TextTarget::SchemaVersion),
                    "resource" => {
                        current_res_id = on_resource(&e, &mut resources);
                    }
                    "file" => on_file(&e, &current_res_id, &mut resources, &mut files),
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                match name.as_str() {
                    "item" => on_item(
                        &e,
                        &default_org_id,
                        &current_org_id,
                        &mut items,
                        &mut first_item_ref_in_default_org,
                        &mut first_item_ref_any,
                    ),
                    "resource" => {
                        on_resource(&e, &mut resources);
                    }
                    "file" => on_file(&e, &current_res_id, &mut resources, &mut files),
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(target) = text_target.take() {
                    let value = t.unescape().map_err(|_| MfErr::Parse)?.into_owned();
                    match target {
                        TextTarget::OrgTitle => title = Some(value),
                        TextTarget::SchemaVersion => schema_version = Some(value),
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let name = name.split(':').last().unwrap_or(&name);
                match name {
                    "organization" => current_org_id = None,
                    "item" => depth_in_item = depth_in_item.saturating_sub(1),
                    "resource" => current_res_id = None,
                    _ => {}
                }
                text_target = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_manifest {
        return Err(MfErr::Parse);
    }

    let chosen_item_ref = first_item_ref_in_default_org
        .or(first_item_ref_any)
        .or_else(|| first_resource_href(&resources))
        .ok_or(MfErr::NoLaunch)?;

    let default_launch = resolve_launch_href(&resources, &chosen_item_ref)
        .or_else(|| first_resource_href(&resources))
        .ok_or(MfErr::NoLaunch)?;

    let scos = items
        .into_iter()
        .filter_map(|(ident, identifierref, params)| {
            resolve_launch_href(&resources, &identifierref).map(|href| (ident, href, params))
        })
        .collect();

    Ok(ParsedManifest {
        title,
        schema_version,
        default_launch,
        scos,
        files,
    })
}

// ------------- helpers -------------

fn on_item(
    e: &BytesStart<'_>,
    default_org_id: &Option<String>,
    current_org_id: &Option<String>,
    items: &mut Vec<(String, String, Option<String>)>,
    first_in_default: &mut Option<String>,
    first_any: &mut Option<String>,
) {
    let (Some(id), Some(iref)) = (get_attr(e, "identifier"), get_attr(e, "identifierref")) else {
        return;
    };
    if first_any.is_none() {
        *first_any = Some(iref.clone());
    }
    let is_default_org = match (default_org_id, current_org_id) {
        (Some(def), Some(cur)) => def == cur,
        // no default declared: the first organization wins
        (None, Some(_)) => true,
        _ => false,
    };
    if is_default_org && first_in_default.is_none() {
        *first_in_default = Some(iref.clone());
    }
    items.push((id, iref, get_attr(e, "parameters")));
}

fn on_resource(e: &BytesStart<'_>, resources: &mut HashMap<String, ResourceInfo>) -> Option<String> {
    let id = get_attr(e, "identifier")?;
    let info = resources.entry(id.clone()).or_default();
    if let Some(h) = get_attr(e, "href") {
        info.href = Some(h);
    }
    Some(id)
}

fn on_file(
    e: &BytesStart<'_>,
    current_res_id: &Option<String>,
    resources: &mut HashMap<String, ResourceInfo>,
    files: &mut Vec<String>,
) {
    let Some(href) = get_attr(e, "href") else {
        return;
    };
    if let Some(res_id) = current_res_id {
        resources.entry(res_id.clone()).or_default().files.push(href.clone());
    }
    files.push(href);
}

pub(crate) fn local_name(tag: &BytesStart<'_>) -> String {
    let full = String::from_utf8_lossy(tag.name().as_ref()).to_string();
    full.split(':').last().unwrap_or(&full).to_string()
}

pub(crate) fn get_attr(e: &BytesStart<'_>, key_local: &str) -> Option<String> {
    for a in e.attributes().flatten() {
        let key = std::str::from_utf8(a.key.as_ref()).unwrap_or_default();
        let key = key.split(':').last().unwrap_or(key);
        if key == key_local {
            return Some(a.unescape_value().ok()?.into_owned());
        }
    }
    None
}

fn resolve_launch_href(resources: &HashMap<String, ResourceInfo>, identifierref: &str) -> Option<String> {
    let r = resources.get(identifierref)?;
    if let Some(h) = &r.href {
        return Some(h.clone());
    }
    r.files.first().cloned()
}

fn first_resource_href(resources: &HashMap<String, ResourceInfo>) -> Option<String> {
    let mut ids: Vec<&String> = resources.keys().collect();
    ids.sort();
    ids.into_iter().find_map(|id| {
        let r = &resources[id];
        r.href.clone().or_else(|| r.files.first().cloned())
    })
}
