//! Last-complete-document extraction from the sampler's output file.
//!
//! The sampler appends one property-list document per interval with no
//! separator, so the file is a concatenation of documents and its tail may be
//! a document that is still being written. Only the last fragment that both
//! starts and ends with the document markers is decoded.
//!
//! The end marker is matched as plain text. A payload string containing the
//! literal end marker would cut the document short; the resulting fragment
//! then fails to parse and the caller keeps its previous sample.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

pub const DOCUMENT_START: &str = "<plist version=\"1.0\">";
pub const DOCUMENT_END: &str = "</plist>";

/// Bytes read from the end of the file before falling back to a full read.
pub const DEFAULT_TAIL_BYTES: u64 = 512 * 1024;

/// The last fragment of `text` that opens with [`DOCUMENT_START`] and contains
/// [`DOCUMENT_END`], sliced from the start marker through the end marker.
///
/// Fragments are scanned from the end so a truncated trailing document falls
/// back to the complete one before it.
pub fn last_complete_document(text: &str) -> Option<&str> {
    let starts: Vec<usize> = text.match_indices(DOCUMENT_START).map(|(i, _)| i).collect();
    for (n, &start) in starts.iter().enumerate().rev() {
        let fragment_end = starts.get(n + 1).copied().unwrap_or(text.len());
        let fragment = &text[start..fragment_end];
        if let Some(end) = fragment.find(DOCUMENT_END) {
            return Some(&fragment[..end + DOCUMENT_END.len()]);
        }
    }
    None
}

/// Read the last `max_bytes` of `path` as text.
///
/// When the window does not contain a complete document (a single document
/// larger than the window), the whole file is read instead. Invalid UTF-8 at
/// the cut point is replaced rather than rejected.
pub fn read_tail(path: &Path, max_bytes: u64) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len <= max_bytes {
        let mut buf = Vec::with_capacity(len as usize);
        file.read_to_end(&mut buf)?;
        return Ok(String::from_utf8_lossy(&buf).into_owned());
    }

    file.seek(SeekFrom::Start(len - max_bytes))?;
    let mut buf = Vec::with_capacity(max_bytes as usize);
    file.read_to_end(&mut buf)?;
    let tail = String::from_utf8_lossy(&buf).into_owned();
    if last_complete_document(&tail).is_some() {
        return Ok(tail);
    }

    log::debug!("no complete document in last {max_bytes} bytes, reading whole file");
    file.seek(SeekFrom::Start(0))?;
    let mut all = Vec::with_capacity(len as usize);
    file.read_to_end(&mut all)?;
    Ok(String::from_utf8_lossy(&all).into_owned())
}
