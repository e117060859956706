// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal Ogg page inspection for format detection. Demuxing proper is done by the
//! symphonia Ogg reader; detection only needs to recognize the very first page of a
//! logical stream and peek at the packet that starts right behind its header.

use resona_core::io::endian::{ByteOrderReader, LittleEndianReader};

/// Byte offset of the first packet body in a first page with a single-segment
/// lacing table, which is how the identification headers of Vorbis and Opus are
/// required to be laid out.
pub const FIRST_PACKET_OFFSET: usize = 28;

/// Checks whether `header` starts with the first page of a logical Ogg stream.
///
/// An untruncated file begins with a page whose begin-of-stream flag is set, whose
/// page sequence number is zero, and whose granule position is plausibly small.
pub fn is_first_page(header: &[u8]) -> bool {
    if header.len() < FIRST_PACKET_OFFSET {
        return false;
    }

    let granule_position = LittleEndianReader::read_u64(header, 6);
    let page_sequence_number = LittleEndianReader::read_u32(header, 18);

    &header[0..4] == b"OggS"
        && header[4] == 0 // stream structure version
        && header[5] == 0x02 // begin-of-stream, not continued, not end-of-stream
        && granule_position < 0x1_0000_0000
        && page_sequence_number == 0
}

/// Assembles a begin-of-stream page with a single-segment packet. Used by the
/// detection test suites; the checksum is left zero and is not verified by
/// [`is_first_page`].
#[doc(hidden)]
pub fn first_page_with_packet(packet: &[u8]) -> Vec<u8> {
    let mut page = Vec::new();
    page.extend_from_slice(b"OggS");
    page.push(0); // version
    page.push(0x02); // begin of stream
    page.extend_from_slice(&0u64.to_le_bytes()); // granule position
    page.extend_from_slice(&0x1234u32.to_le_bytes()); // serial number
    page.extend_from_slice(&0u32.to_le_bytes()); // page sequence number
    page.extend_from_slice(&0u32.to_le_bytes()); // checksum
    page.push(1); // one lacing segment
    page.push(packet.len() as u8);
    page.extend_from_slice(packet);
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_a_begin_of_stream_page() {
        let page = first_page_with_packet(&[0u8; 32]);
        assert!(is_first_page(&page));
    }

    #[test]
    fn rejects_continuation_and_foreign_pages() {
        let mut page = first_page_with_packet(&[0u8; 32]);
        page[5] = 0x00;
        assert!(!is_first_page(&page));

        let mut page = first_page_with_packet(&[0u8; 32]);
        page[18] = 7; // non-zero page sequence number
        assert!(!is_first_page(&page));

        let mut page = first_page_with_packet(&[0u8; 32]);
        page[0..4].copy_from_slice(b"RIFF");
        assert!(!is_first_page(&page));

        assert!(!is_first_page(&[0u8; 8]));
    }
}
