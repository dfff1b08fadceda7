//! Incident input files.

use std::path::Path;

use serde::Deserialize;
use verifix_severity_models::Incident;

/// Accepted shapes of an incidents file.
#[derive(Deserialize)]
#[serde(untagged)]
enum IncidentDocument {
    List(Vec<Incident>),
    Wrapped { incidents: Vec<Incident> },
    Single(Incident),
}

/// Parses a JSON array of incidents, an `{"incidents": [...]}` object or
/// a single incident object.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if `text` is none of those.
pub fn parse_incidents(text: &str) -> Result<Vec<Incident>, serde_json::Error> {
    Ok(match serde_json::from_str(text)? {
        IncidentDocument::List(incidents) | IncidentDocument::Wrapped { incidents } => incidents,
        IncidentDocument::Single(incident) => vec![incident],
    })
}

/// Reads and parses an incidents file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_incidents(path: &Path) -> Result<Vec<Incident>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Couldn't read incidents from {}: {e}", path.display()))?;
    let incidents = parse_incidents(&text)
        .map_err(|e| format!("Invalid incidents file {}: {e}", path.display()))?;
    log::info!("Read {} incidents from {}", incidents.len(), path.display());
    Ok(incidents)
}
