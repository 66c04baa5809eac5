// XLIFF 1.2 to 2.1 conversion for translation exchange files.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::{
    manifest::{get_attr, local_name},
    util::escape,
};

pub const XLIFF21_NS: &str = "urn:oasis:names:tc:xliff:document:2.1";

#[derive(Error, Debug)]
pub enum XliffErr {
    #[error("XLIFF file is not valid UTF-8")]
    Encoding,
    #[error("failed to parse XLIFF document")]
    Parse,
    #[error("expected XLIFF 1.2, found version {0}")]
    Version(String),
    #[error("XLIFF document has no <file>")]
    NoFile,
    #[error("XLIFF <file> has no <body>")]
    NoBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransUnit {
    pub id: String,
    pub source: String,
    pub target: Option<String>,
}

/// Content of the first `<file>` of an XLIFF 1.2 document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XliffFile {
    pub src_lang: String,
    pub trg_lang: String,
    pub units: Vec<TransUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Source,
    Target,
}

#[derive(Default)]
struct PendingUnit {
    id: String,
    source: String,
    target: String,
}

impl PendingUnit {
    fn finish(self) -> TransUnit {
        TransUnit {
            id: self.id,
            source: self.source,
            target: Some(self.target).filter(|t| !t.is_empty()),
        }
    }
}

/// Read the trans-units of the first `<file>`. Inline markup inside
/// `<source>`/`<target>` is flattened to its text.
pub fn read_xliff12(xml: &str) -> Result<XliffFile, XliffErr> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut saw_root = false;
    let mut saw_file = false;
    let mut saw_body = false;
    let mut in_file = false;
    let mut in_body = false;
    let mut src_lang = String::new();
    let mut trg_lang = String::new();

    let mut units: Vec<TransUnit> = Vec::new();
    let mut unit: Option<PendingUnit> = None;
    let mut field: Option<Field> = None;
    let mut inline_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|_| XliffErr::Parse)?;
        match event {
            // inline markup such as <g> or <mrk> inside a source or target
            Event::Start(_) if field.is_some() => inline_depth += 1,
            Event::End(_) if field.is_some() && inline_depth > 0 => inline_depth -= 1,
            Event::Start(e) => {
                match local_name(&e).as_str() {
                    "xliff" => {
                        saw_root = true;
                        if let Some(v) = get_attr(&e, "version").filter(|v| !v.starts_with("1.")) {
                            return Err(XliffErr::Version(v));
                        }
                    }
                    "file" if !saw_file => {
                        saw_file = true;
                        in_file = true;
                        src_lang = get_attr(&e, "source-language").unwrap_or_default();
                        trg_lang = get_attr(&e, "target-language").unwrap_or_default();
                    }
                    "body" if in_file => {
                        saw_body = true;
                        in_body = true;
                    }
                    "trans-unit" if in_body => {
                        unit = Some(PendingUnit {
                            id: get_attr(&e, "id")
                                .unwrap_or_else(|| format!("u{}", units.len() + 1)),
                            ..PendingUnit::default()
                        });
                    }
                    "source" if unit.is_some() => field = Some(Field::Source),
                    "target" if unit.is_some() => field = Some(Field::Target),
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if field.is_none() && in_body && local_name(&e) == "trans-unit" {
                    let id = get_attr(&e, "id").unwrap_or_else(|| format!("u{}", units.len() + 1));
                    units.push(PendingUnit { id, ..PendingUnit::default() }.finish());
                }
            }
            Event::Text(t) => {
                if let (Some(f), Some(u)) = (field, unit.as_mut()) {
                    let text = t.unescape().map_err(|_| XliffErr::Parse)?;
                    match f {
                        Field::Source => u.source.push_str(&text),
                        Field::Target => u.target.push_str(&text),
                    }
                }
            }
            Event::CData(c) => {
                if let (Some(f), Some(u)) = (field, unit.as_mut()) {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    match f {
                        Field::Source => u.source.push_str(&text),
                        Field::Target => u.target.push_str(&text),
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "source" | "target" => field = None,
                    "trans-unit" => {
                        if let Some(u) = unit.take() {
                            units.push(u.finish());
                        }
                    }
                    "body" => in_body = false,
                    "file" => in_file = false,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(XliffErr::Parse);
    }
    if !saw_file {
        return Err(XliffErr::NoFile);
    }
    if !saw_body {
        return Err(XliffErr::NoBody);
    }
    Ok(XliffFile {
        src_lang,
        trg_lang,
        units,
    })
}

pub fn render_xliff21(file: &XliffFile) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!("<xliff version=\"2.1\" xmlns=\"{XLIFF21_NS}\">\n"));
    out.push_str(&format!(
        "  <file id=\"f1\" srcLang=\"{}\" trgLang=\"{}\">\n",
        escape(&file.src_lang),
        escape(&file.trg_lang)
    ));
    for u in &file.units {
        out.push_str(&format!("    <unit id=\"{}\">\n      <segment>\n", escape(&u.id)));
        out.push_str(&format!("        <source>{}</source>\n", escape(&u.source)));
        if let Some(target) = &u.target {
            out.push_str(&format!("        <target>{}</target>\n", escape(target)));
        }
        out.push_str("      </segment>\n    </unit>\n");
    }
    out.push_str("  </file>\n</xliff>\n");
    out
}

pub fn convert_12_to_21(bytes: &[u8]) -> Result<String, XliffErr> {
    let xml = std::str::from_utf8(bytes).map_err(|_| XliffErr::Encoding)?;
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    Ok(render_xliff21(&read_xliff12(xml)?))
}
