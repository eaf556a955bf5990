use crc32fast::Hasher;
use std::collections::HashSet;

/// Derive a stable document ID from the markup text using CRC32
pub fn get_document_id(source: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(source.as_bytes());
    format!("doc-{:x}", hasher.finalize())
}

/// Sequential ID generator for nodes that arrive without an `id`
#[derive(Clone)]
pub struct IDGenerator {
    seed: String, // Document ID
    count: u32,   // Sequential counter
    reserved: HashSet<String>,
}

impl IDGenerator {
    pub fn from_seed(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            count: 0,
            reserved: HashSet::new(),
        }
    }

    /// IDs already present in the document; generated IDs skip them
    pub fn with_reserved<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Generate next sequential ID
    pub fn new_id(&mut self) -> String {
        loop {
            self.count += 1;
            let id = format!("{}-{}", self.seed, self.count);
            if !self.reserved.contains(&id) {
                return id;
            }
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_generation() {
        let id1 = get_document_id("<document><p>a</p></document>");
        let id2 = get_document_id("<document><p>a</p></document>");

        // Same source always generates same ID
        assert_eq!(id1, id2);

        let id3 = get_document_id("<document><p>b</p></document>");
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_sequential_ids() {
        let mut gen = IDGenerator::from_seed("doc");

        assert_eq!(gen.new_id(), "doc-1");
        assert_eq!(gen.new_id(), "doc-2");
        assert_eq!(gen.seed(), "doc");
    }

    #[test]
    fn test_reserved_ids_are_skipped() {
        let mut gen = IDGenerator::from_seed("doc").with_reserved(["doc-1", "doc-3"]);

        assert_eq!(gen.new_id(), "doc-2");
        assert_eq!(gen.new_id(), "doc-4");
    }
}
