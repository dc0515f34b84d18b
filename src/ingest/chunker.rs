//! Splits long text into overlapping passages.

use crate::config::ChunkConfig;

/// Splits `text` into chunks of at most `chunk_size` characters.
///
/// Chunks end at the last whitespace before the size limit when there is
/// one, and consecutive chunks share up to `chunk_overlap` characters.
/// Chunks are trimmed; blank ones are dropped. Expects a validated config
/// (`chunk_overlap < chunk_size`).
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let n = chars.len();
    let byte = |i: usize| chars.get(i).map_or(text.len(), |&(b, _)| b);
    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < n {
        let mut end = (start + size).min(n);
        if end < n {
            // Break after the last whitespace that still leaves room to advance
            if let Some(ws) = (start + overlap + 1..end)
                .rev()
                .find(|&i| chars[i].1.is_whitespace())
            {
                end = ws;
            }
        }

        let chunk = text[byte(start)..byte(end)].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end >= n {
            break;
        }

        start = end - overlap;
        // Don't open the next chunk mid-word
        if start > 0 && !chars[start - 1].1.is_whitespace() {
            if let Some(ws) = (start..end).find(|&i| chars[i].1.is_whitespace()) {
                start = ws + 1;
            }
        }
    }

    chunks
}
