//! Sentence-aware splitter for sub-chunking oversized chunks.
//!
//! Splits on paragraph boundaries (`\n\n`) first, then sentences, packing
//! units greedily into token-bounded windows with a trailing-unit overlap
//! carried into the next window. A single unit larger than the window is
//! hard-split on whitespace.

/// Token-bounded, paragraph-respecting text splitter.
#[derive(Debug, Clone, Copy)]
pub struct SentenceSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SentenceSplitter {
    /// Create a splitter with the given token window and overlap.
    #[must_use]
    pub const fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Split text into windows of at most `chunk_size` tokens.
    ///
    /// `count_tokens` is injected so the splitter stays tokenizer-agnostic.
    pub fn split(&self, text: &str, count_tokens: &dyn Fn(&str) -> usize) -> Vec<String> {
        let units = self.build_units(text, count_tokens);
        if units.is_empty() {
            return Vec::new();
        }

        let mut windows: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_tokens = 0usize;

        for (unit, tokens) in units {
            if current_tokens + tokens > self.chunk_size && !current.is_empty() {
                windows.push(current.join("\n\n"));

                // Seed the next window with trailing units up to the overlap.
                let mut carried: Vec<(String, usize)> = Vec::new();
                let mut carried_tokens = 0usize;
                for prev in current.iter().rev() {
                    let prev_tokens = count_tokens(prev);
                    if carried_tokens + prev_tokens > self.chunk_overlap {
                        break;
                    }
                    carried_tokens += prev_tokens;
                    carried.push((prev.clone(), prev_tokens));
                }
                carried.reverse();

                current = carried.iter().map(|(u, _)| u.clone()).collect();
                current_tokens = carried_tokens;
            }

            current.push(unit);
            current_tokens += tokens;
        }

        if !current.is_empty() {
            windows.push(current.join("\n\n"));
        }

        windows
    }

    /// Break text into (unit, token_count) pairs no larger than the window.
    fn build_units(
        &self,
        text: &str,
        count_tokens: &dyn Fn(&str) -> usize,
    ) -> Vec<(String, usize)> {
        let mut units = Vec::new();

        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim_end();
            if paragraph.trim().is_empty() {
                continue;
            }

            let tokens = count_tokens(paragraph);
            if tokens <= self.chunk_size {
                units.push((paragraph.to_string(), tokens));
                continue;
            }

            for sentence in split_sentences(paragraph) {
                let tokens = count_tokens(&sentence);
                if tokens <= self.chunk_size {
                    units.push((sentence, tokens));
                } else {
                    units.extend(self.split_by_words(&sentence, count_tokens));
                }
            }
        }

        units
    }

    /// Last resort for a sentence larger than the window: greedy word packing.
    fn split_by_words(
        &self,
        text: &str,
        count_tokens: &dyn Fn(&str) -> usize,
    ) -> Vec<(String, usize)> {
        let mut pieces = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_tokens = 0usize;

        for word in text.split_whitespace() {
            let word_tokens = count_tokens(word);
            if current_tokens + word_tokens > self.chunk_size && !current.is_empty() {
                let piece = current.join(" ");
                let tokens = count_tokens(&piece);
                pieces.push((piece, tokens));
                current.clear();
                current_tokens = 0;
            }
            current.push(word);
            current_tokens += word_tokens;
        }

        if !current.is_empty() {
            let piece = current.join(" ");
            let tokens = count_tokens(&piece);
            pieces.push((piece, tokens));
        }

        pieces
    }
}

/// Split a paragraph into sentences on terminator-plus-whitespace
/// boundaries, falling back to line boundaries for list-heavy text.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();

    for line in paragraph.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let mut start = 0usize;
        let mut prev_was_terminator = false;
        for (idx, c) in line.char_indices() {
            if prev_was_terminator && c.is_whitespace() {
                let sentence = line[start..idx].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = idx;
            }
            prev_was_terminator = matches!(c, '.' | '!' | '?');
        }

        let tail = line[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_count(text: &str) -> usize {
        text.split_whitespace().count()
    }

    #[test]
    fn test_short_text_single_window() {
        let splitter = SentenceSplitter::new(100, 10);
        let windows = splitter.split("Một đoạn văn ngắn.", &word_count);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0], "Một đoạn văn ngắn.");
    }

    #[test]
    fn test_windows_respect_chunk_size() {
        let splitter = SentenceSplitter::new(12, 4);
        let text = (0..10)
            .map(|i| format!("Câu số {i} có đúng sáu từ."))
            .collect::<Vec<_>>()
            .join("\n\n");

        let windows = splitter.split(&text, &word_count);
        assert!(windows.len() > 1);
        for window in &windows {
            assert!(word_count(window) <= 12 + 4, "window too large: {window}");
        }
    }

    #[test]
    fn test_overlap_carries_trailing_unit() {
        let splitter = SentenceSplitter::new(12, 6);
        let text = "Đoạn một có đúng sáu từ.\n\nĐoạn hai có đúng sáu từ.\n\nĐoạn ba có đúng sáu từ.";

        let windows = splitter.split(text, &word_count);
        assert!(windows.len() >= 2);
        // The unit that closed window N reappears at the head of window N+1.
        assert!(windows[1].starts_with("Đoạn hai có đúng sáu từ."));
    }

    #[test]
    fn test_giant_sentence_hard_split() {
        let splitter = SentenceSplitter::new(5, 0);
        let text = "một hai ba bốn năm sáu bảy tám chín mười";

        let windows = splitter.split(text, &word_count);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], "một hai ba bốn năm");
        assert_eq!(windows[1], "sáu bảy tám chín mười");
    }

    #[test]
    fn test_sentence_boundaries() {
        let sentences = split_sentences("Câu một. Câu hai! Câu ba?");
        assert_eq!(sentences, vec!["Câu một.", "Câu hai!", "Câu ba?"]);
    }

    #[test]
    fn test_table_rows_kept_intact() {
        // Table rows have no sentence terminators, so they split on lines.
        let sentences = split_sentences("| STT | Môn học | TC |\n| 1 | Triết học | 3 |");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].starts_with("| STT"));
    }
}
