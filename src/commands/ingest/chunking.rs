pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() || size == 0 {
        return Vec::new();
    }

    let chars = text.chars().collect::<Vec<char>>();
    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::<String>::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += step;
    }

    chunks
}
