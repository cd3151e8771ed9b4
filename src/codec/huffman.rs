//! QPACK/HPACK-style Huffman coding for string literals (RFC 7541
//! Appendix B shape: common header-text bytes get short codes,
//! rare control bytes get long ones).
//!
//! The symbol table is a canonical Huffman code built once from a static
//! weight table approximating real-world HTTP header byte frequency
//! (lowercase letters, digits, and `-`/`:`/`/` dominate; control bytes are
//! rare). Building it canonically from weights — rather than hand-copying
//! a literal bit-pattern table — keeps the encoder and decoder provably
//! consistent with each other by construction: the Kraft inequality holds
//! exactly because canonical assignment derives codes from sorted lengths.
//! See DESIGN.md for the call on exact RFC table fidelity.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::OnceLock;

use super::CodecError;

#[derive(Clone, Copy)]
struct Code {
    bits: u32,
    len: u8,
}

struct HuffmanTable {
    by_symbol: [Code; 256],
    // decode lookup: for each bit-length, the sorted (code, symbol) pairs.
    by_length: Vec<Vec<(u32, u8)>>,
    max_len: u8,
}

fn header_byte_weight(b: u8) -> u32 {
    match b {
        b'a'..=b'z' => 400,
        b'0'..=b'9' => 250,
        b'-' | b':' | b'/' | b'.' | b' ' => 300,
        b'A'..=b'Z' => 60,
        0x20..=0x7e => 40,
        _ => 1,
    }
}

fn build_table() -> HuffmanTable {
    #[derive(Clone)]
    enum Node {
        Leaf(u8),
        Branch(Box<Node>, Box<Node>),
    }

    let mut heap: BinaryHeap<Reverse<(u32, usize, Node)>> = BinaryHeap::new();
    for sym in 0..=255u16 {
        let w = header_byte_weight(sym as u8);
        heap.push(Reverse((w, sym as usize, Node::Leaf(sym as u8))));
    }
    let mut tiebreak = 256usize;
    while heap.len() > 1 {
        let Reverse((w1, _, n1)) = heap.pop().unwrap();
        let Reverse((w2, _, n2)) = heap.pop().unwrap();
        tiebreak += 1;
        heap.push(Reverse((w1 + w2, tiebreak, Node::Branch(Box::new(n1), Box::new(n2)))));
    }
    let Reverse((_, _, root)) = heap.pop().unwrap();

    let mut lengths = [0u8; 256];
    fn walk(node: &Node, depth: u8, lengths: &mut [u8; 256]) {
        match node {
            Node::Leaf(sym) => lengths[*sym as usize] = depth.max(1),
            Node::Branch(l, r) => {
                walk(l, depth + 1, lengths);
                walk(r, depth + 1, lengths);
            }
        }
    }
    walk(&root, 0, &mut lengths);

    // Canonical assignment: symbols sorted by (length, symbol value) get
    // consecutive codes, incrementing and left-shifting on each length
    // increase. This is what guarantees the table is prefix-free.
    let mut order: Vec<u8> = (0..=255u16).map(|s| s as u8).collect();
    order.sort_by_key(|&s| (lengths[s as usize], s));

    let mut by_symbol = [Code { bits: 0, len: 0 }; 256];
    let mut code: u32 = 0;
    let mut prev_len = lengths[order[0] as usize];
    for &sym in &order {
        let len = lengths[sym as usize];
        code <<= len - prev_len;
        by_symbol[sym as usize] = Code { bits: code, len };
        code += 1;
        prev_len = len;
    }

    let max_len = lengths.iter().copied().max().unwrap_or(1);
    let mut by_length = vec![Vec::new(); max_len as usize + 1];
    for sym in 0..=255usize {
        let c = by_symbol[sym];
        by_length[c.len as usize].push((c.bits, sym as u8));
    }
    for bucket in &mut by_length {
        bucket.sort_unstable();
    }

    HuffmanTable { by_symbol, by_length, max_len }
}

fn table() -> &'static HuffmanTable {
    static TABLE: OnceLock<HuffmanTable> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

/// Bit length the encoded form of `data` would take, without allocating.
pub fn encoded_bit_len(data: &[u8]) -> usize {
    let t = table();
    data.iter().map(|&b| t.by_symbol[b as usize].len as usize).sum()
}

/// Encodes `data`, padding the final byte with 1-bits (the RFC 7541 §5.2
/// padding rule — the pad must be a prefix of the longest code in the
/// table, which an all-ones run always is for a canonical code).
pub fn encode(data: &[u8]) -> Vec<u8> {
    let t = table();
    let bit_len = encoded_bit_len(data);
    let mut out = vec![0u8; bit_len.div_ceil(8)];
    let mut bit_pos = 0usize;
    for &b in data {
        let Code { bits, len } = t.by_symbol[b as usize];
        for i in (0..len).rev() {
            let bit = (bits >> i) & 1;
            if bit != 0 {
                out[bit_pos / 8] |= 0x80 >> (bit_pos % 8);
            }
            bit_pos += 1;
        }
    }
    // pad remaining bits in the last byte with 1s
    while bit_pos % 8 != 0 {
        out[bit_pos / 8] |= 0x80 >> (bit_pos % 8);
        bit_pos += 1;
    }
    out
}

/// Decodes exactly the Huffman-coded bytes in `data`, verifying that any
/// trailing pad bits are all 1s and no shorter than 8 bits (a malformed
/// encoding per RFC 7541 §5.2 otherwise).
pub fn decode(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let t = table();
    let total_bits = data.len() * 8;
    let mut bit_pos = 0usize;
    let mut out = Vec::new();

    while bit_pos < total_bits {
        let remaining = total_bits - bit_pos;
        if remaining < t.by_length.iter().position(|b| !b.is_empty()).map(|l| l as usize).unwrap_or(1) {
            break;
        }
        let mut found = None;
        let mut code = 0u32;
        for len in 1..=t.max_len {
            if bit_pos + len as usize > total_bits {
                break;
            }
            let bit_index = bit_pos + (len as usize - 1);
            let bit = (data[bit_index / 8] >> (7 - bit_index % 8)) & 1;
            code = (code << 1) | bit as u32;
            if let Ok(idx) = t.by_length[len as usize].binary_search_by_key(&code, |&(c, _)| c) {
                found = Some((len, t.by_length[len as usize][idx].1));
                break;
            }
        }
        match found {
            Some((len, sym)) => {
                out.push(sym);
                bit_pos += len as usize;
            }
            None => {
                // remaining bits must be a valid all-ones pad, and no
                // longer than 7 bits.
                let pad_len = total_bits - bit_pos;
                if pad_len > 7 {
                    return Err(CodecError::InvalidHuffman);
                }
                for i in bit_pos..total_bits {
                    if (data[i / 8] >> (7 - i % 8)) & 1 == 0 {
                        return Err(CodecError::InvalidHuffman);
                    }
                }
                bit_pos = total_bits;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_like_text() {
        for s in [
            "",
            "x-bench",
            "content-type",
            "application/json; charset=utf-8",
            "GET /index.html HTTP/1.1",
        ] {
            let encoded = encode(s.as_bytes());
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded, s.as_bytes());
        }
    }

    #[test]
    fn common_header_bytes_compress_shorter_than_raw() {
        let s = "content-type-application-json-0123456789";
        let encoded = encode(s.as_bytes());
        assert!(encoded.len() < s.len(), "common header bytes should compress");
    }

    proptest::proptest! {
        #[test]
        fn prop_round_trip(bytes in proptest::collection::vec(0u8..=255u8, 0..64)) {
            let encoded = encode(&bytes);
            let decoded = decode(&encoded).unwrap();
            proptest::prop_assert_eq!(decoded, bytes);
        }
    }
}
