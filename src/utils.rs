/// Splits `text` into chunks of at most `chunk_size` characters, consecutive
/// chunks sharing up to `chunk_overlap` characters.
///
/// Chunks end at the last paragraph break inside the window if there is one,
/// else the last line break, else the last space, else mid-word. Chunks are
/// trimmed and blank chunks are dropped.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size - 1);
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + chunk_size).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            soft_break(&chars[start..hard_end], chunk_overlap)
                .map(|offset| start + offset)
                .unwrap_or(hard_end)
        };

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end == chars.len() {
            break;
        }
        start = overlap_start(&chars, start, end, chunk_overlap);
    }

    chunks
}

/// Window offset just past the preferred separator, provided it leaves room
/// for progress beyond the overlap.
fn soft_break(window: &[char], chunk_overlap: usize) -> Option<usize> {
    const SEPARATORS: [&[char]; 3] = [&['\n', '\n'], &['\n'], &[' ']];

    for separator in SEPARATORS {
        let found = window
            .windows(separator.len())
            .rposition(|w| w == separator)
            .map(|pos| pos + separator.len());
        if let Some(offset) = found {
            if offset > chunk_overlap {
                return Some(offset);
            }
        }
    }
    None
}

/// Start of the next chunk: `chunk_overlap` characters back from `end`,
/// moved forward to the next word start.
fn overlap_start(chars: &[char], start: usize, end: usize, chunk_overlap: usize) -> usize {
    let mut next = end.saturating_sub(chunk_overlap).max(start + 1);
    if next > 0 && !chars[next - 1].is_whitespace() {
        if let Some(ws) = chars[next..end].iter().position(|c| c.is_whitespace()) {
            next += ws + 1;
        }
    }
    next
}

/// Cuts `name` to the 31-character limit spreadsheet tools put on sheet
/// names.
pub fn truncate_sheet_name(name: &str) -> String {
    name.chars().take(31).collect()
}

/// File-system friendly form of a company name.
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "company".to_string()
    } else {
        stem
    }
}
