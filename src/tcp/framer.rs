use bytes::{Bytes, BytesMut};

/// Turns the continuous byte stream of a receive socket into fixed-size
/// packets.
///
/// Bytes go in via [`feed`](PacketFramer::feed) in whatever chunks the
/// kernel hands out; [`next_block`](PacketFramer::next_block) pops complete
/// `packet_size` blocks in arrival order. A trailing partial block stays
/// buffered until the bytes completing it arrive - it is never emitted.
pub struct PacketFramer {
    packet_size: usize,
    buf: BytesMut,
}

impl PacketFramer {
    pub fn new(packet_size: usize) -> PacketFramer {
        assert!(packet_size > 0, "packet size must be positive");
        PacketFramer {
            packet_size,
            buf: BytesMut::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn next_block(&mut self) -> Option<Bytes> {
        if self.buf.len() >= self.packet_size {
            Some(self.buf.split_to(self.packet_size).freeze())
        } else {
            None
        }
    }

    #[cfg(test)]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn drain(framer: &mut PacketFramer) -> Vec<Bytes> {
        let mut blocks = Vec::new();
        while let Some(block) = framer.next_block() {
            blocks.push(block);
        }
        blocks
    }

    #[rstest]
    #[case::empty(4, vec![], vec![], 0)]
    #[case::partial(4, vec![vec![1, 2, 3]], vec![], 3)]
    #[case::exact(4, vec![vec![1, 2, 3, 4]], vec![vec![1, 2, 3, 4]], 0)]
    #[case::three_in_one_read(
        2,
        vec![vec![1, 2, 3, 4, 5, 6]],
        vec![vec![1, 2], vec![3, 4], vec![5, 6]],
        0
    )]
    #[case::split_across_reads(
        4,
        vec![vec![1, 2], vec![3, 4, 5]],
        vec![vec![1, 2, 3, 4]],
        1
    )]
    #[case::one_byte_reads(
        3,
        vec![vec![1], vec![2], vec![3], vec![4]],
        vec![vec![1, 2, 3]],
        1
    )]
    #[case::packet_size_one(1, vec![vec![7, 8]], vec![vec![7], vec![8]], 0)]
    fn test_framing(
        #[case] packet_size: usize,
        #[case] reads: Vec<Vec<u8>>,
        #[case] expected: Vec<Vec<u8>>,
        #[case] expected_buffered: usize,
    ) {
        let mut framer = PacketFramer::new(packet_size);

        let mut blocks = Vec::new();
        for read in reads {
            framer.feed(&read);
            blocks.extend(drain(&mut framer));
        }

        let expected = expected.into_iter().map(Bytes::from).collect::<Vec<_>>();
        assert_eq!(blocks, expected);
        assert_eq!(framer.buffered(), expected_buffered);
    }

    #[test]
    fn test_partial_block_completed_later() {
        let mut framer = PacketFramer::new(4);

        framer.feed(&[1, 2, 3]);
        assert_eq!(framer.next_block(), None);

        framer.feed(&[4, 5, 6, 7, 8]);
        assert_eq!(framer.next_block(), Some(Bytes::from_static(&[1, 2, 3, 4])));
        assert_eq!(framer.next_block(), Some(Bytes::from_static(&[5, 6, 7, 8])));
        assert_eq!(framer.next_block(), None);
    }
}
