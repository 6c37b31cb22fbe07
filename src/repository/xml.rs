use super::{ChangedPath, LogEntry};
use crate::error::RepositoryError;
use crate::types::{ChangeKind, NodeKind};
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// One `<entry>` of `svn info --xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoEntry {
    pub kind: NodeKind,
    pub revision: u64,
    pub url: Option<String>,
    pub root: Option<String>,
    pub uuid: Option<String>,
    pub last_changed_revision: Option<u64>,
}

/// One `<entry>` of `svn list --xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub kind: NodeKind,
    pub size: Option<u64>,
}

fn parse_error(command: &str, reason: impl ToString) -> RepositoryError {
    RepositoryError::ParseFailed {
        command: command.to_string(),
        reason: reason.to_string(),
    }
}

fn attribute(
    element: &BytesStart<'_>,
    name: &str,
    command: &str,
) -> Result<Option<String>, RepositoryError> {
    match element
        .try_get_attribute(name)
        .map_err(|e| parse_error(command, e))?
    {
        Some(attr) => Ok(Some(
            attr.unescape_value()
                .map_err(|e| parse_error(command, e))?
                .into_owned(),
        )),
        None => Ok(None),
    }
}

fn revision_attribute(
    element: &BytesStart<'_>,
    command: &str,
) -> Result<Option<u64>, RepositoryError> {
    attribute(element, "revision", command)?
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|e| parse_error(command, format!("bad revision '{}': {}", value, e)))
        })
        .transpose()
}

/// Parse `svn info --xml`
pub fn parse_info(xml: &[u8]) -> Result<Vec<InfoEntry>, RepositoryError> {
    const COMMAND: &str = "info";
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut entries = Vec::new();
    let mut current: Option<InfoEntry> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                text.clear();
                match e.local_name().as_ref() {
                    b"entry" => {
                        current = Some(InfoEntry {
                            kind: NodeKind::from_svn(
                                &attribute(&e, "kind", COMMAND)?.unwrap_or_default(),
                            ),
                            revision: revision_attribute(&e, COMMAND)?.unwrap_or(0),
                            url: None,
                            root: None,
                            uuid: None,
                            last_changed_revision: None,
                        });
                    }
                    b"commit" => {
                        if let Some(entry) = current.as_mut() {
                            entry.last_changed_revision = revision_attribute(&e, COMMAND)?;
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                text.push_str(&t.unescape().map_err(|e| parse_error(COMMAND, e))?);
            }
            Ok(Event::End(e)) => {
                let value = std::mem::take(&mut text);
                match (e.local_name().as_ref(), current.as_mut()) {
                    (b"url", Some(entry)) => entry.url = Some(value.trim().to_string()),
                    (b"root", Some(entry)) => entry.root = Some(value.trim().to_string()),
                    (b"uuid", Some(entry)) => entry.uuid = Some(value.trim().to_string()),
                    (b"entry", _) => entries.extend(current.take()),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(COMMAND, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

/// Parse `svn list --xml`
pub fn parse_list(xml: &[u8]) -> Result<Vec<ListEntry>, RepositoryError> {
    const COMMAND: &str = "list";
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut entries = Vec::new();
    let mut current: Option<ListEntry> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                text.clear();
                if e.local_name().as_ref() == b"entry" {
                    current = Some(ListEntry {
                        name: String::new(),
                        kind: NodeKind::from_svn(
                            &attribute(&e, "kind", COMMAND)?.unwrap_or_default(),
                        ),
                        size: None,
                    });
                }
            }
            Ok(Event::Text(t)) => {
                text.push_str(&t.unescape().map_err(|e| parse_error(COMMAND, e))?);
            }
            Ok(Event::End(e)) => {
                let value = std::mem::take(&mut text);
                match (e.local_name().as_ref(), current.as_mut()) {
                    (b"name", Some(entry)) => entry.name = value.trim().to_string(),
                    (b"size", Some(entry)) => {
                        let size = value.trim().parse::<u64>().map_err(|e| {
                            parse_error(COMMAND, format!("bad size '{}': {}", value, e))
                        })?;
                        entry.size = Some(size);
                    }
                    (b"entry", _) => entries.extend(current.take()),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(COMMAND, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

/// Build one changed path from a `<path>` element; `Err` names the bad attribute
fn changed_path(
    path: &str,
    (action, kind, copy_from_path, copy_from_rev): (String, String, Option<String>, Option<String>),
) -> Result<ChangedPath, String> {
    let change =
        ChangeKind::from_action(&action).ok_or_else(|| format!("unknown action '{}'", action))?;
    let copy_from_revision = copy_from_rev
        .map(|rev| {
            rev.parse::<u64>()
                .map_err(|err| format!("bad copyfrom-rev '{}': {}", rev, err))
        })
        .transpose()?;
    Ok(ChangedPath {
        path: path.to_string(),
        change,
        kind: NodeKind::from_svn(&kind),
        copy_from_path,
        copy_from_revision,
    })
}

/// Parse `svn log --xml -v`
pub fn parse_log(xml: &[u8]) -> Result<Vec<LogEntry>, RepositoryError> {
    const COMMAND: &str = "log";
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut entries = Vec::new();
    let mut current: Option<LogEntry> = None;
    // action, kind, copyfrom-path, copyfrom-rev of the <path> being read
    let mut path_attrs: Option<(String, String, Option<String>, Option<String>)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                text.clear();
                match e.local_name().as_ref() {
                    b"logentry" => {
                        let revision = revision_attribute(&e, COMMAND)?.ok_or_else(|| {
                            parse_error(COMMAND, "logentry without revision")
                        })?;
                        current = Some(LogEntry {
                            revision,
                            author: None,
                            date: DateTime::<Utc>::default(),
                            message: String::new(),
                            changed_paths: Vec::new(),
                        });
                    }
                    b"path" => {
                        path_attrs = Some((
                            attribute(&e, "action", COMMAND)?.unwrap_or_default(),
                            attribute(&e, "kind", COMMAND)?.unwrap_or_default(),
                            attribute(&e, "copyfrom-path", COMMAND)?,
                            attribute(&e, "copyfrom-rev", COMMAND)?,
                        ));
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                text.push_str(&t.unescape().map_err(|e| parse_error(COMMAND, e))?);
            }
            Ok(Event::End(e)) => {
                let value = std::mem::take(&mut text);
                match (e.local_name().as_ref(), current.as_mut()) {
                    (b"author", Some(entry)) => entry.author = Some(value),
                    (b"date", Some(entry)) => {
                        entry.date = DateTime::parse_from_rfc3339(value.trim())
                            .map_err(|err| {
                                parse_error(COMMAND, format!("bad date '{}': {}", value, err))
                            })?
                            .with_timezone(&Utc);
                    }
                    (b"msg", Some(entry)) => entry.message = value,
                    (b"path", Some(entry)) => {
                        let attrs = path_attrs.take().unwrap_or_default();
                        match changed_path(value.trim(), attrs) {
                            Ok(changed) => entry.changed_paths.push(changed),
                            Err(reason) => tracing::warn!(
                                "Skipping changed path [{}] in revision {}: {}",
                                value.trim(),
                                entry.revision,
                                reason
                            ),
                        }
                    }
                    (b"logentry", _) => entries.extend(current.take()),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(COMMAND, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}
