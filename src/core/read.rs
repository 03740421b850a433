/// One unit of input: a read name and its bases.
///
/// Records are produced by a stream source, handed to exactly one worker and
/// dropped once their rows reach the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub id: String,
    pub sequence: String,
}

impl SequenceRecord {
    pub fn new(id: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence: sequence.into(),
        }
    }

    /// Build a record from raw name/sequence bytes as yielded by the FASTX readers
    #[must_use]
    pub fn from_bytes(name: &[u8], sequence: &[u8]) -> Self {
        Self {
            id: String::from_utf8_lossy(name).into_owned(),
            sequence: String::from_utf8_lossy(sequence).into_owned(),
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// GC content of a sequence as a percentage in `[0, 100]`.
///
/// Only uppercase `G` and `C` are counted. An empty sequence has a GC content of 0.
#[must_use]
pub fn gc_percentage(sequence: &str) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let gc = sequence
        .bytes()
        .filter(|&b| b == b'G' || b == b'C')
        .count();

    #[allow(clippy::cast_precision_loss)]
    {
        100.0 * gc as f64 / sequence.len() as f64
    }
}
