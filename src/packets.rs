//! Splitting of bulk IN transfers into USB packets.
//!
//! A bulk transfer ends with the first packet shorter than the endpoint's maximum
//! packet size. A payload that is an exact multiple of that size therefore needs a
//! trailing zero-length packet, or the host keeps waiting for more data.

/// Packets making up one bulk transfer of `data`.
///
/// Yields full packets of `max_packet` bytes followed by one short packet, which is
/// empty when `data` is a multiple of `max_packet` (including an empty `data`).
pub struct Packets<'a> {
    rest: &'a [u8],
    max_packet: usize,
    done: bool,
}

impl<'a> Packets<'a> {
    pub fn new(data: &'a [u8], max_packet: usize) -> Self {
        Self {
            rest: data,
            max_packet: max_packet.max(1),
            done: false,
        }
    }
}

impl<'a> Iterator for Packets<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.rest.len() >= self.max_packet {
            let (packet, rest) = self.rest.split_at(self.max_packet);
            self.rest = rest;
            return Some(packet);
        }

        self.done = true;
        Some(core::mem::take(&mut self.rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lengths(data: &[u8], max_packet: usize) -> Vec<usize> {
        Packets::new(data, max_packet).map(<[u8]>::len).collect()
    }

    #[test]
    fn short_payload_is_one_packet() {
        assert_eq!(lengths(&[1, 2, 3], 64), [3]);
    }

    #[test]
    fn full_packet_gets_terminator() {
        assert_eq!(lengths(&[0xA5; 64], 64), [64, 0]);
    }

    #[test]
    fn multiple_full_packets_get_one_terminator() {
        assert_eq!(lengths(&[0; 128], 64), [64, 64, 0]);
    }

    #[test]
    fn long_payload_ends_short() {
        assert_eq!(lengths(&[0; 130], 64), [64, 64, 2]);
    }

    #[test]
    fn empty_payload_is_a_single_empty_packet() {
        assert_eq!(lengths(&[], 64), [0]);
    }

    proptest! {
        #[test]
        fn packets_reassemble_and_end_short(data in proptest::collection::vec(any::<u8>(), 0..300), max_packet in 1usize..80) {
            let packets: Vec<&[u8]> = Packets::new(&data, max_packet).collect();

            let (last, full) = packets.split_last().unwrap();
            prop_assert!(last.len() < max_packet);
            prop_assert!(full.iter().all(|p| p.len() == max_packet));
            prop_assert_eq!(packets.concat(), data);
        }
    }
}
