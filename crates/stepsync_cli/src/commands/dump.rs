//! Dump command implementation.

use super::parse_doc;
use serde::Serialize;
use std::path::Path;
use stepsync_protocol::DocId;
use stepsync_store::{FileStepStore, StepStore};

/// One committed step for output.
#[derive(Debug, Serialize)]
pub struct StepInfo {
    /// Version at which the step was committed (1-based).
    pub version: u64,
    /// Session that produced the step.
    pub origin: String,
    /// Opaque step payload.
    pub step: serde_json::Value,
}

/// A document log for output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDump {
    /// Document id.
    pub doc: String,
    /// Current document version.
    pub version: u64,
    /// Steps after the requested version.
    pub steps: Vec<StepInfo>,
}

/// Summary line for the document listing.
#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    /// Document id.
    pub doc: String,
    /// Current document version.
    pub version: u64,
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    doc: Option<&str>,
    since: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No step store found at {:?}", path).into());
    }
    let store = FileStepStore::open(path)?;

    let Some(doc) = doc else {
        let summaries = list_documents(&store)?;
        match format {
            "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
            _ => {
                println!("Documents: {}", summaries.len());
                for summary in &summaries {
                    println!("  {:<32} v{}", summary.doc, summary.version);
                }
            }
        }
        return Ok(());
    };

    let dump = dump_document(&store, &parse_doc(doc)?, since)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&dump)?),
        _ => print_text_output(&dump),
    }
    Ok(())
}

/// Lists every document with a log in the store.
pub fn list_documents(
    store: &FileStepStore,
) -> Result<Vec<DocumentSummary>, Box<dyn std::error::Error>> {
    let mut summaries = Vec::new();
    for doc in store.documents()? {
        summaries.push(DocumentSummary {
            version: store.version(&doc)?,
            doc: doc.to_string(),
        });
    }
    Ok(summaries)
}

/// Reads a document's log from `since` onwards.
pub fn dump_document(
    store: &dyn StepStore,
    doc: &DocId,
    since: u64,
) -> Result<DocumentDump, Box<dyn std::error::Error>> {
    let log = store.read(doc, since)?;
    let steps = log
        .steps
        .into_iter()
        .zip(log.origin_ids)
        .zip(since + 1..)
        .map(|((step, origin), version)| StepInfo {
            version,
            origin: origin.to_string(),
            step: step.into_payload(),
        })
        .collect();

    Ok(DocumentDump {
        doc: doc.to_string(),
        version: log.version,
        steps,
    })
}

fn print_text_output(dump: &DocumentDump) {
    println!("Document: {}", dump.doc);
    println!("Version:  {}", dump.version);
    println!();

    if dump.steps.is_empty() {
        println!("(no steps)");
        return;
    }

    println!("{:>8}  {:<36}  STEP", "VERSION", "ORIGIN");
    for info in &dump.steps {
        println!("{:>8}  {:<36}  {}", info.version, info.origin, info.step);
    }
}
