//! 文本分块

/// 把原始文本切成有序的段落序列
pub trait TextChunker: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// 递归字符分块
///
/// 依次尝试按段落、换行、空格切分，直到每块不超过 `chunk_size` 个字符；
/// 相邻块之间保留最多 `chunk_overlap` 个字符的重叠。
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new(400, 100)
    }
}

impl RecursiveChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: ["\n\n", "\n", " ", ""].iter().map(|s| s.to_string()).collect(),
        }
    }

    fn len(text: &str) -> usize {
        text.chars().count()
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        // 选择文本中出现的第一个分隔符，空串表示按字符切
        let (index, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(sep.as_str()))
            .map(|(i, sep)| (i, sep.as_str()))
            .unwrap_or((separators.len(), ""));
        let remaining = separators.get(index + 1..).unwrap_or(&[]);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut small = Vec::new();
        for piece in pieces {
            if Self::len(&piece) <= self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(&small, separator));
                small.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge(&small, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = Self::len(separator);
        let mut chunks = Vec::new();
        let mut window: std::collections::VecDeque<&String> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let piece_len = Self::len(piece);
            let joined_len = if window.is_empty() { 0 } else { sep_len };
            if total + piece_len + joined_len > self.chunk_size && !window.is_empty() {
                chunks.push(Self::join(&window, separator));
                // 缩小窗口直到满足重叠上限且能容纳下一段
                while let Some(front) = window.front() {
                    let overflow = total + piece_len + sep_len > self.chunk_size;
                    if total <= self.chunk_overlap && !overflow {
                        break;
                    }
                    total -= Self::len(front) + if window.len() > 1 { sep_len } else { 0 };
                    window.pop_front();
                }
            }
            total += piece_len + if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
        }
        if !window.is_empty() {
            chunks.push(Self::join(&window, separator));
        }
        chunks
    }

    fn join(window: &std::collections::VecDeque<&String>, separator: &str) -> String {
        window
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(separator)
            .trim()
            .to_string()
    }
}

impl TextChunker for RecursiveChunker {
    fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DocumentLoader, PlainTextLoader};

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = RecursiveChunker::default();
        assert_eq!(chunker.split("just one line"), vec!["just one line"]);
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let chunker = RecursiveChunker::new(40, 10);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu xi \
                    omicron pi rho sigma tau upsilon phi chi psi omega";

        let chunks = chunker.split(text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert!(chunks.first().unwrap().starts_with("alpha"));
        assert!(chunks.last().unwrap().ends_with("omega"));
    }

    #[test]
    fn test_adjacent_chunks_overlap() {
        let chunker = RecursiveChunker::new(20, 8);
        let chunks = chunker.split("one two three four five six seven eight");

        assert!(chunks.len() > 1);
        let first_tail = chunks[0].split(' ').last().unwrap();
        assert!(chunks[1].starts_with(first_tail));
    }

    #[test]
    fn test_paragraphs_split_first() {
        let chunker = RecursiveChunker::new(30, 0);
        let chunks = chunker.split("first paragraph here\n\nsecond paragraph here");
        assert_eq!(chunks, vec!["first paragraph here", "second paragraph here"]);
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let chunker = RecursiveChunker::new(10, 0);
        let chunks = chunker.split(&"x".repeat(25));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[tokio::test]
    async fn test_plain_text_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "# Title\n\nBody").unwrap();

        let text = PlainTextLoader.load(&path).await.unwrap();
        assert!(text.contains("Body"));

        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "  \n").unwrap();
        assert!(PlainTextLoader.load(&empty).await.is_err());
        assert!(PlainTextLoader.load(&dir.path().join("missing.txt")).await.is_err());
    }
}
