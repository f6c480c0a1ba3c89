//! Domain name codec.
//!
//! A name is converted to a sequence of 64-bit words which sorts the same
//! way for every name of equal encoded length. Each label occupies one or
//! more whole words:
//!
//! ```text
//!
//!   byte:   0          1    2    3    4    5    6    7
//!         +----------+----+----+----+----+----+----+----+
//!   word 0| header   | c0 | c1 | c2 | c3 | c4 | c5 | c6 |
//!         +----------+----+----+----+----+----+----+----+
//!   word 1| c7       | c8 | ...                         |
//!         +----------+----------------------------------+
//!
//!   header: low nibble  - number of words of the label,
//!           high nibble - bytes used in the last word (0 means all 8).
//!
//! ```
//!
//! Bytes are stored little-endian inside a word, letters are folded to upper
//! case and unused bytes are zero. Labels keep their order in the name so the
//! leftmost label can be dropped by skipping its words.
use crate::error::Error;
use crate::IResult;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Maximum number of bytes of a whole domain name.
pub const MAX_NAME: usize = 255;
/// Maximum number of labels, and so of words, of an encoded name.
pub const MAX_LABELS: usize = MAX_NAME / 2;
/// Maximum number of bytes of a single label.
pub const MAX_LABEL: usize = 63;

const WORD: usize = 8;
const LABEL_WORDS: usize = (MAX_LABEL + 1) / WORD;

/// An encoded domain name. Cheap to clone, dropping labels shares the words.
#[derive(Clone)]
pub struct WordKey {
    words: Arc<[u64]>,
    start: usize,
}

impl WordKey {
    /// The key of the root zone.
    pub fn empty() -> Self {
        Self::from_words(Vec::new())
    }

    pub fn from_words(words: Vec<u64>) -> Self {
        WordKey {
            words: Arc::from(words),
            start: 0,
        }
    }

    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words[self.start..]
    }
}

impl Deref for WordKey {
    type Target = [u64];

    fn deref(&self) -> &[u64] {
        self.words()
    }
}

impl PartialEq for WordKey {
    fn eq(&self, other: &Self) -> bool {
        self.words() == other.words()
    }
}

impl Eq for WordKey {}

impl PartialOrd for WordKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WordKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.words().cmp(other.words())
    }
}

impl Hash for WordKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.words().hash(state)
    }
}

impl fmt::Debug for WordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WordKey[")?;
        for (i, w) in self.words().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:016x}", w)?;
        }
        f.write_str("]")
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Escape {
    Regular,
    FirstChar,
    SecondDigit,
    ThirdDigit,
}

/// Accumulates label bytes into words.
struct Encoder {
    out: Vec<u64>,
    label: [u64; LABEL_WORDS],
    // Number of complete words of the current label.
    n: usize,
    fragment: [u8; WORD],
    // Next free byte of `fragment`.
    j: usize,
    count: usize,
}

impl Encoder {
    fn new() -> Self {
        Encoder {
            out: Vec::with_capacity(MAX_LABELS),
            label: [0; LABEL_WORDS],
            n: 0,
            fragment: [0; WORD],
            j: 1,
            count: 1,
        }
    }

    fn push(&mut self, mut b: u8) -> IResult<()> {
        if b.is_ascii_lowercase() {
            b &= 0xdf;
        }
        self.fragment[self.j] = b;
        self.j += 1;

        self.count += 1;
        if self.count > MAX_NAME {
            return Err(Error::NameTooLong);
        }

        if self.j >= WORD {
            self.push_word()?;
            self.j = 0;
        }
        Ok(())
    }

    fn push_word(&mut self) -> IResult<()> {
        if self.n >= LABEL_WORDS {
            return Err(Error::LabelTooLong);
        }
        self.label[self.n] = u64::from_le_bytes(self.fragment);
        self.n += 1;
        Ok(())
    }

    fn close_label(&mut self) -> IResult<()> {
        if self.j > 0 {
            for b in self.fragment[self.j..].iter_mut() {
                *b = 0;
            }
            self.push_word()?;
        }
        self.label[0] |= self.n as u64 | ((self.j as u64) << 4);
        self.out.extend_from_slice(&self.label[..self.n]);

        self.n = 0;
        self.j = 1;
        self.fragment[0] = 0;
        Ok(())
    }

    fn is_label_empty(&self) -> bool {
        self.n < 1 && self.j <= 1
    }
}

/// Encodes a domain name in presentation format. Both the empty string and
/// "." give the empty key of the root zone. `\X` and `\DDD` escapes are
/// accepted.
pub fn encode(name: &str) -> IResult<WordKey> {
    if name.is_empty() || name == "." {
        return Ok(WordKey::empty());
    }

    let mut e = Encoder::new();
    let mut esc = Escape::Regular;
    let mut code: u32 = 0;
    for &b in name.as_bytes() {
        match esc {
            Escape::Regular => match b {
                b'.' => {
                    if e.is_label_empty() {
                        return Err(Error::EmptyLabel);
                    }
                    e.count += 1;
                    e.close_label()?;
                }
                b'\\' => esc = Escape::FirstChar,
                _ => e.push(b)?,
            },
            Escape::FirstChar => {
                if !b.is_ascii_digit() {
                    esc = Escape::Regular;
                    e.push(b)?;
                    continue;
                }
                code = (b - b'0') as u32 * 100;
                if code > u8::MAX as u32 {
                    return Err(Error::InvalidEscape);
                }
                esc = Escape::SecondDigit;
            }
            Escape::SecondDigit => {
                if !b.is_ascii_digit() {
                    return Err(Error::InvalidEscape);
                }
                code += (b - b'0') as u32 * 10;
                if code > u8::MAX as u32 {
                    return Err(Error::InvalidEscape);
                }
                esc = Escape::ThirdDigit;
            }
            Escape::ThirdDigit => {
                if !b.is_ascii_digit() {
                    return Err(Error::InvalidEscape);
                }
                code += (b - b'0') as u32;
                if code > u8::MAX as u32 {
                    return Err(Error::InvalidEscape);
                }
                esc = Escape::Regular;
                e.push(code as u8)?;
            }
        }
    }

    if esc != Escape::Regular {
        return Err(Error::InvalidEscape);
    }

    if !e.is_label_empty() {
        e.close_label()?;
    }

    Ok(WordKey::from_words(e.out))
}

/// Returns the key of the parent zone. The key of a single label name, and
/// the empty key, give the empty key.
pub fn drop_leftmost_label(key: &WordKey) -> WordKey {
    let words = key.words();
    if let Some(&first) = words.first() {
        let n = (first & 0xf) as usize;
        if n > 0 && n < words.len() {
            return WordKey {
                words: key.words.clone(),
                start: key.start + n,
            };
        }
    }
    WordKey::empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_example_com() {
        let k = encode("example.com").unwrap();
        assert_eq!(
            &[
                // E L P M A X E 1+0
                0x454c504d41584501,
                // M O C 1+4
                0x4d4f4341,
            ][..],
            k.words()
        );
        assert_eq!(k, encode("EXAMPLE.COM.").unwrap());
    }

    #[test]
    fn test_encode_long_label() {
        let k = encode("looooooooooooooong.example.com").unwrap();
        assert_eq!(
            &[
                // O O O O O O L 3+3
                0x4f4f4f4f4f4f4c33,
                0x4f4f4f4f4f4f4f4f,
                // G N O
                0x0000000000474e4f,
                0x454c504d41584501,
                0x000000004d4f4341,
            ][..],
            k.words()
        );

        let k = encode("loooooooooooooong.example").unwrap();
        assert_eq!(
            &[
                0x4f4f4f4f4f4f4c23,
                0x4f4f4f4f4f4f4f4f,
                0x000000000000474e,
                0x454c504d41584501,
            ][..],
            k.words()
        );
    }

    #[test]
    fn test_encode_root() {
        assert!(encode("").unwrap().is_empty());
        assert!(encode(".").unwrap().is_empty());
    }

    #[test]
    fn test_encode_escapes() {
        assert_eq!(encode("a\\.b.com").unwrap().len(), 2);
        assert_eq!(encode("\\065bc.com").unwrap(), encode("abc.com").unwrap());
        assert_eq!(encode("\\a\\b\\c.com").unwrap(), encode("abc.com").unwrap());
    }

    #[test]
    fn test_encode_errors() {
        let mut cases = vec![
            ("..", "empty label"),
            (".com", "empty label"),
            ("www..com", "empty label"),
            ("a\\", "invalid escape sequence"),
            ("a\\1", "invalid escape sequence"),
            ("a\\12", "invalid escape sequence"),
            ("a\\1x3", "invalid escape sequence"),
            ("a\\256", "invalid escape sequence"),
            ("a\\300", "invalid escape sequence"),
        ];
        for (name, expect) in cases.drain(..) {
            let err = encode(name).expect_err(name);
            assert_eq!(err.to_string(), expect, "{}", name);
        }

        let label = "x".repeat(MAX_LABEL);
        assert!(encode(&format!("{}.com", label)).is_ok());
        assert!(matches!(
            encode(&format!("{}x.com", label)),
            Err(Error::LabelTooLong)
        ));

        let name = vec!["a"; 128].join(".");
        assert!(matches!(encode(&name), Err(Error::NameTooLong)));
        let name = vec!["a"; 127].join(".");
        assert_eq!(encode(&name).unwrap().len(), MAX_LABELS);
    }

    #[test]
    fn test_drop_leftmost_label() {
        let k = encode("a.b.example.com").unwrap();
        let k = drop_leftmost_label(&k);
        assert_eq!(k, encode("b.example.com").unwrap());
        let k = drop_leftmost_label(&k);
        assert_eq!(k, encode("example.com").unwrap());
        let k = drop_leftmost_label(&k);
        assert_eq!(k, encode("com").unwrap());
        let k = drop_leftmost_label(&k);
        assert!(k.is_empty());
        assert!(drop_leftmost_label(&k).is_empty());

        let k = encode("looooooooooooooong.example.com").unwrap();
        assert_eq!(drop_leftmost_label(&k), encode("example.com").unwrap());
    }

    #[test]
    fn test_order_is_word_wise() {
        let a = encode("example.com").unwrap();
        let b = encode("example.gov").unwrap();
        let c = encode("example.net").unwrap();
        let d = encode("example.org").unwrap();
        let mut v = vec![b.clone(), d.clone(), a.clone(), c.clone()];
        v.sort();
        // G R O < M O C < T E N < V O G
        assert_eq!(vec![d, a, c, b], v);
    }
}
