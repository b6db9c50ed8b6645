//! Minimal AndroidManifest.xml model

use crate::error::{Result, ScanError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

/// An `<activity>` declared under `<application>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activity {
    pub name: String,
    pub launch_mode: Option<String>,
    pub exported: Option<String>,
}

impl Activity {
    /// `singleTask`, or its compiled integer form
    pub fn is_single_task(&self) -> bool {
        matches!(self.launch_mode.as_deref(), Some("singleTask") | Some("2"))
    }

    pub fn is_exported(&self) -> bool {
        self.exported.as_deref() == Some("true")
    }
}

/// The manifest fields the analyzers look at
#[derive(Debug, Clone, Default)]
pub struct AndroidManifest {
    pub package: Option<String>,
    pub version_name: Option<String>,
    pub min_sdk: Option<u32>,
    pub debuggable: bool,
    pub activities: Vec<Activity>,
}

impl AndroidManifest {
    /// Read and parse a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScanError::Validation(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse manifest XML; attributes are matched by local name
    pub fn parse(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        let mut buf = Vec::new();
        let mut manifest = AndroidManifest::default();
        let mut seen_root = false;
        let mut in_application = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    manifest.visit(&e, &mut seen_root)?;
                    match e.local_name().as_ref() {
                        b"application" => in_application = true,
                        b"activity" if in_application => {
                            manifest.activities.push(activity_from(&e))
                        }
                        _ => {}
                    }
                }
                Ok(Event::Empty(e)) => {
                    manifest.visit(&e, &mut seen_root)?;
                    if in_application && e.local_name().as_ref() == b"activity" {
                        manifest.activities.push(activity_from(&e));
                    }
                }
                Ok(Event::End(e)) => {
                    if e.local_name().as_ref() == b"application" {
                        in_application = false;
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ScanError::Validation(format!(
                        "malformed AndroidManifest.xml at byte {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }

            buf.clear();
        }

        if !seen_root {
            return Err(ScanError::Validation(
                "AndroidManifest.xml has no <manifest> element".into(),
            ));
        }

        Ok(manifest)
    }

    fn visit(&mut self, e: &BytesStart<'_>, seen_root: &mut bool) -> Result<()> {
        let attrs = local_attributes(e);
        match e.local_name().as_ref() {
            b"manifest" => {
                *seen_root = true;
                self.package = attrs.get("package").cloned();
                self.version_name = attrs.get("versionName").cloned();
            }
            b"application" => {
                self.debuggable = attrs.get("debuggable").map(String::as_str) == Some("true");
            }
            b"uses-sdk" => {
                self.min_sdk = attrs.get("minSdkVersion").and_then(|v| v.trim().parse().ok());
            }
            _ if !*seen_root => {
                return Err(ScanError::Validation(format!(
                    "expected <manifest> root element, found <{}>",
                    String::from_utf8_lossy(e.name().as_ref())
                )));
            }
            _ => {}
        }
        Ok(())
    }

    /// Activities with a singleTask launch mode
    pub fn single_task_activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.iter().filter(|a| a.is_single_task())
    }
}

fn activity_from(e: &BytesStart<'_>) -> Activity {
    let mut attrs = local_attributes(e);
    Activity {
        name: attrs.remove("name").unwrap_or_default(),
        launch_mode: attrs.remove("launchMode"),
        exported: attrs.remove("exported"),
    }
}

fn local_attributes(e: &BytesStart<'_>) -> HashMap<String, String> {
    e.attributes()
        .flatten()
        .map(|attr| {
            (
                String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                String::from_utf8_lossy(&attr.value).into_owned(),
            )
        })
        .collect()
}
