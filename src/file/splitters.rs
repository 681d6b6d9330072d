/// Splits an accumulating byte stream into discrete records.
///
/// Implementations must be stateless across calls; the undelimited tail is
/// threaded through by the caller.
pub trait ChunkSplitter: Send + Sync {
    /// Appends `new_bytes` to the carried `tail` and returns all complete
    /// records plus the remainder after the last delimiter.
    fn split(&self, tail: Vec<u8>, new_bytes: &[u8]) -> (Vec<Vec<u8>>, Vec<u8>);
}

/// Newline-delimited splitter. A `\r` immediately before the `\n` is
/// stripped from the record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NewlineChunkSplitter;

impl ChunkSplitter for NewlineChunkSplitter {
    fn split(&self, tail: Vec<u8>, new_bytes: &[u8]) -> (Vec<Vec<u8>>, Vec<u8>) {
        if new_bytes.is_empty() {
            return (Vec::new(), tail);
        }

        let mut pending = tail;
        pending.extend_from_slice(new_bytes);

        let mut records = Vec::new();
        let mut start = 0;
        while let Some(pos) = pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            let record_end = if end > start && pending[end - 1] == b'\r' {
                end - 1
            } else {
                end
            };
            records.push(pending[start..record_end].to_vec());
            start = end + 1;
        }

        let new_tail = pending.split_off(start);
        (records, new_tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(tail: &[u8], new_bytes: &[u8]) -> (Vec<Vec<u8>>, Vec<u8>) {
        NewlineChunkSplitter.split(tail.to_vec(), new_bytes)
    }

    #[test]
    fn empty_input_leaves_tail_unchanged() {
        let (records, tail) = split(b"partial", b"");
        assert!(records.is_empty());
        assert_eq!(tail, b"partial");
    }

    #[test]
    fn read_without_terminator_grows_tail() {
        let (records, tail) = split(b"par", b"tial");
        assert!(records.is_empty());
        assert_eq!(tail, b"partial");
    }

    #[test]
    fn multiple_records_emitted_in_order() {
        let (records, tail) = split(b"", b"one\ntwo\nthree\n");
        assert_eq!(records, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert!(tail.is_empty());
    }

    #[test]
    fn terminator_straddling_reads_reassembles_record() {
        let (records, tail) = split(b"", b"hel");
        assert!(records.is_empty());

        let (records, tail) = split(&tail, b"lo\nwor");
        assert_eq!(records, vec![b"hello".to_vec()]);
        assert_eq!(tail, b"wor");

        let (records, tail) = split(&tail, b"ld\n");
        assert_eq!(records, vec![b"world".to_vec()]);
        assert!(tail.is_empty());
    }

    #[test]
    fn crlf_terminator_stripped() {
        let (records, tail) = split(b"", b"windows line\r\nnext");
        assert_eq!(records, vec![b"windows line".to_vec()]);
        assert_eq!(tail, b"next");
    }

    #[test]
    fn empty_lines_are_records() {
        let (records, _) = split(b"", b"\n\n");
        assert_eq!(records, vec![Vec::<u8>::new(), Vec::<u8>::new()]);
    }
}
