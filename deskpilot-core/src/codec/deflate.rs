//! zlib stream writer with an LZ77 + fixed-Huffman deflate compressor.
//!
//! Output is a single final block (`BTYPE = 01`). Matches are found with
//! hash chains over 3-byte prefixes inside a 32 KiB window.

const WINDOW_SIZE: usize = 32 * 1024;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 258;
const HASH_BITS: u32 = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
/// Candidates examined per position before settling for the best so far.
const MAX_CHAIN: usize = 64;
const NIL: u32 = u32::MAX;

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

const END_OF_BLOCK: u16 = 256;

/// Compress `data` into a complete zlib stream (header, deflate, Adler-32).
pub fn zlib_compress(data: &[u8]) -> Vec<u8> {
    let mut bits = BitWriter::with_capacity(data.len() / 2 + 64);
    // CMF: deflate, 32 KiB window. FLG: no dictionary, FCHECK so that
    // (CMF << 8 | FLG) % 31 == 0.
    bits.out.extend_from_slice(&[0x78, 0x01]);

    // BFINAL = 1, BTYPE = 01 (fixed Huffman).
    bits.put(1, 1);
    bits.put(1, 2);
    lz77(data, &mut bits);
    write_literal(&mut bits, END_OF_BLOCK);

    let mut out = bits.finish();
    out.extend_from_slice(&adler32(data).to_be_bytes());
    out
}

/// Adler-32 checksum as defined by RFC 1950.
pub fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65_521;
    // Largest n such that 255n(n+1)/2 + (n+1)(MOD-1) fits in u32.
    const NMAX: usize = 5552;

    let (mut a, mut b) = (1u32, 0u32);
    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a += byte as u32;
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}

// ── LZ77 ─────────────────────────────────────────────────────────

fn hash3(data: &[u8], i: usize) -> usize {
    let v = (data[i] as u32) << 16 | (data[i + 1] as u32) << 8 | data[i + 2] as u32;
    (v.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
}

fn lz77(data: &[u8], bits: &mut BitWriter) {
    let mut head = vec![NIL; HASH_SIZE];
    let mut prev = vec![NIL; WINDOW_SIZE];

    let insert = |head: &mut [u32], prev: &mut [u32], i: usize| {
        if i + MIN_MATCH <= data.len() {
            let h = hash3(data, i);
            prev[i % WINDOW_SIZE] = head[h];
            head[h] = i as u32;
        }
    };

    let mut i = 0;
    while i < data.len() {
        let (len, dist) = longest_match(data, i, &head, &prev);
        if len >= MIN_MATCH {
            write_match(bits, len, dist);
            for p in i..i + len {
                insert(&mut head, &mut prev, p);
            }
            i += len;
        } else {
            write_literal(bits, data[i] as u16);
            insert(&mut head, &mut prev, i);
            i += 1;
        }
    }
}

/// Best `(length, distance)` for position `i`; length 0 when none.
fn longest_match(data: &[u8], i: usize, head: &[u32], prev: &[u32]) -> (usize, usize) {
    if i + MIN_MATCH > data.len() {
        return (0, 0);
    }
    let max_len = MAX_MATCH.min(data.len() - i);
    let mut best = (0, 0);

    let mut candidate = head[hash3(data, i)];
    let mut steps = 0;
    while candidate != NIL && steps < MAX_CHAIN {
        let c = candidate as usize;
        // Chains only ever point backwards; a forward link is a stale slot.
        if c >= i {
            break;
        }
        let dist = i - c;
        if dist >= WINDOW_SIZE {
            break;
        }

        let len = data[c..]
            .iter()
            .zip(&data[i..i + max_len])
            .take_while(|(a, b)| a == b)
            .count();
        if len > best.0 {
            best = (len, dist);
            if len == max_len {
                break;
            }
        }

        candidate = prev[c % WINDOW_SIZE];
        steps += 1;
    }
    best
}

// ── Fixed Huffman symbols ────────────────────────────────────────

/// Fixed literal/length code (RFC 1951 §3.2.6) as `(code, bit length)`.
fn fixed_litlen_code(symbol: u16) -> (u16, u32) {
    match symbol {
        0..=143 => (0x30 + symbol, 8),
        144..=255 => (0x190 + (symbol - 144), 9),
        256..=279 => (symbol - 256, 7),
        _ => (0xC0 + (symbol - 280), 8),
    }
}

fn write_literal(bits: &mut BitWriter, symbol: u16) {
    let (code, len) = fixed_litlen_code(symbol);
    bits.put_huffman(code, len);
}

fn write_match(bits: &mut BitWriter, len: usize, dist: usize) {
    let li = LENGTH_BASE.partition_point(|&b| b as usize <= len) - 1;
    write_literal(bits, 257 + li as u16);
    bits.put(
        (len - LENGTH_BASE[li] as usize) as u32,
        LENGTH_EXTRA[li] as u32,
    );

    let di = DIST_BASE.partition_point(|&b| b as usize <= dist) - 1;
    bits.put_huffman(di as u16, 5);
    bits.put((dist - DIST_BASE[di] as usize) as u32, DIST_EXTRA[di] as u32);
}

// ── BitWriter ────────────────────────────────────────────────────

/// LSB-first bit packer.
struct BitWriter {
    out: Vec<u8>,
    acc: u64,
    nbits: u32,
}

impl BitWriter {
    fn with_capacity(cap: usize) -> Self {
        Self {
            out: Vec::with_capacity(cap),
            acc: 0,
            nbits: 0,
        }
    }

    /// Append the low `n` bits of `value`, least significant first.
    fn put(&mut self, value: u32, n: u32) {
        if n == 0 {
            return;
        }
        self.acc |= ((value & ((1u32 << n) - 1)) as u64) << self.nbits;
        self.nbits += n;
        while self.nbits >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.nbits -= 8;
        }
    }

    /// Huffman codes are packed most significant bit first.
    fn put_huffman(&mut self, code: u16, len: u32) {
        let reversed = code.reverse_bits() >> (16 - len);
        self.put(reversed as u32, len);
    }

    fn finish(mut self) -> Vec<u8> {
        if self.nbits > 0 {
            self.out.push(self.acc as u8);
            self.acc = 0;
            self.nbits = 0;
        }
        self.out
    }
}
