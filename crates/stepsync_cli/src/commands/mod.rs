//! CLI command implementations.

pub mod dump;
pub mod reset;
pub mod simulate;

use stepsync_protocol::DocId;

/// Parses a document id given on the command line.
pub(crate) fn parse_doc(raw: &str) -> Result<DocId, Box<dyn std::error::Error>> {
    Ok(DocId::new(raw)?)
}
