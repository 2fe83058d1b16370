//! Text codecs for raw archive metadata.
//!
//! Archives store pathnames, link targets and extended attribute names as raw
//! bytes.  A [`Codec`] renders those bytes as text for presentation and turns
//! text back into bytes when writing.  Decoding is a pure transform: it never
//! alters what is stored in the archive, and the same bytes decoded with the
//! same codec always give the same text.
//!
//! Reading with a different codec than the one used for writing produces
//! different text (or an [`EncodingError`]).  That is expected and not an error
//! of this crate.

use std::{fmt, str::FromStr};

use encoding_rs::{DecoderResult, EncoderResult, Encoding, UTF_8};

use crate::error::EncodingError;

/// IBM code page 037 (EBCDIC, US/Canada) to Unicode.  Every byte maps to a code
/// point below U+0100 and the mapping is a bijection.
const CP037_DECODE: [u8; 256] = [
    0x00, 0x01, 0x02, 0x03, 0x9c, 0x09, 0x86, 0x7f,
    0x97, 0x8d, 0x8e, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    0x10, 0x11, 0x12, 0x13, 0x9d, 0x85, 0x08, 0x87,
    0x18, 0x19, 0x92, 0x8f, 0x1c, 0x1d, 0x1e, 0x1f,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x0a, 0x17, 0x1b,
    0x88, 0x89, 0x8a, 0x8b, 0x8c, 0x05, 0x06, 0x07,
    0x90, 0x91, 0x16, 0x93, 0x94, 0x95, 0x96, 0x04,
    0x98, 0x99, 0x9a, 0x9b, 0x14, 0x15, 0x9e, 0x1a,
    0x20, 0xa0, 0xe2, 0xe4, 0xe0, 0xe1, 0xe3, 0xe5,
    0xe7, 0xf1, 0xa2, 0x2e, 0x3c, 0x28, 0x2b, 0x7c,
    0x26, 0xe9, 0xea, 0xeb, 0xe8, 0xed, 0xee, 0xef,
    0xec, 0xdf, 0x21, 0x24, 0x2a, 0x29, 0x3b, 0xac,
    0x2d, 0x2f, 0xc2, 0xc4, 0xc0, 0xc1, 0xc3, 0xc5,
    0xc7, 0xd1, 0xa6, 0x2c, 0x25, 0x5f, 0x3e, 0x3f,
    0xf8, 0xc9, 0xca, 0xcb, 0xc8, 0xcd, 0xce, 0xcf,
    0xcc, 0x60, 0x3a, 0x23, 0x40, 0x27, 0x3d, 0x22,
    0xd8, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67,
    0x68, 0x69, 0xab, 0xbb, 0xf0, 0xfd, 0xfe, 0xb1,
    0xb0, 0x6a, 0x6b, 0x6c, 0x6d, 0x6e, 0x6f, 0x70,
    0x71, 0x72, 0xaa, 0xba, 0xe6, 0xb8, 0xc6, 0xa4,
    0xb5, 0x7e, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78,
    0x79, 0x7a, 0xa1, 0xbf, 0xd0, 0xdd, 0xde, 0xae,
    0x5e, 0xa3, 0xa5, 0xb7, 0xa9, 0xa7, 0xb6, 0xbc,
    0xbd, 0xbe, 0x5b, 0x5d, 0xaf, 0xa8, 0xb4, 0xd7,
    0x7b, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47,
    0x48, 0x49, 0xad, 0xf4, 0xf6, 0xf2, 0xf3, 0xf5,
    0x7d, 0x4a, 0x4b, 0x4c, 0x4d, 0x4e, 0x4f, 0x50,
    0x51, 0x52, 0xb9, 0xfb, 0xfc, 0xf9, 0xfa, 0xff,
    0x5c, 0xf7, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58,
    0x59, 0x5a, 0xb2, 0xd4, 0xd6, 0xd2, 0xd3, 0xd5,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37,
    0x38, 0x39, 0xb3, 0xdb, 0xdc, 0xd9, 0xda, 0x9f,
];

const CP037_ENCODE: [u8; 256] = invert(&CP037_DECODE);

const fn invert(table: &[u8; 256]) -> [u8; 256] {
    let mut inverse = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        inverse[table[i] as usize] = i as u8;
        i += 1;
    }
    inverse
}

/// A bidirectional text encoding for archive metadata fields.
///
/// The named variants are the codecs archives commonly use.  Any other
/// encoding known to `encoding_rs` is available through [`Codec::Other`],
/// looked up by its WHATWG label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Codec {
    /// UTF-8; invalid sequences are an error.
    #[default]
    Utf8,
    /// 7-bit US-ASCII.
    Ascii,
    /// ISO-8859-1: every byte is the code point of the same value.
    ///
    /// This is the strict encoding, unlike the WHATWG `iso-8859-1` label which
    /// means windows-1252.
    Latin1,
    /// EBCDIC code page 037.
    Cp037,
    /// Any other single or multi-byte encoding.
    Other(&'static Encoding),
}

impl Codec {
    /// The named codecs.
    pub const ALL: [Codec; 4] = [Codec::Utf8, Codec::Ascii, Codec::Latin1, Codec::Cp037];

    /// Canonical name of the codec.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Utf8 => "utf-8",
            Codec::Ascii => "ascii",
            Codec::Latin1 => "latin-1",
            Codec::Cp037 => "cp037",
            Codec::Other(encoding) => (*encoding).name(),
        }
    }

    /// Looks up a codec by name.
    ///
    /// The names of the named codecs match ignoring case, `-` and `_`; anything
    /// else is resolved as a WHATWG encoding label.  Encodings that cannot
    /// encode back to themselves (UTF-16, `replacement`) are refused.
    pub fn from_name(name: &str) -> Result<Self, EncodingError> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "utf8" => return Ok(Codec::Utf8),
            "ascii" | "usascii" | "646" => return Ok(Codec::Ascii),
            "latin1" | "iso88591" | "l1" => return Ok(Codec::Latin1),
            "cp037" | "ibm037" | "ibm039" | "ebcdiccpus" | "ebcdiccpca" => {
                return Ok(Codec::Cp037)
            }
            _ => {}
        }

        match Encoding::for_label(name.as_bytes()) {
            Some(encoding) if encoding == UTF_8 => Ok(Codec::Utf8),
            Some(encoding) if encoding.output_encoding() == encoding => {
                Ok(Codec::Other(encoding))
            }
            _ => Err(EncodingError::UnknownCodec(name.to_string())),
        }
    }

    /// Derives a codec from the `LC_ALL`, `LC_CTYPE` and `LANG` environment
    /// variables, in that order of precedence.
    ///
    /// Nothing in this crate calls this implicitly: the codec of a reader or
    /// writer is always the one passed in its options.
    pub fn from_locale() -> Self {
        let locale = ["LC_ALL", "LC_CTYPE", "LANG"]
            .into_iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty());

        let Some(locale) = locale else {
            return Codec::default();
        };

        // "en_US.ISO-8859-1@euro" -> "ISO-8859-1"
        let charset = locale
            .split_once('.')
            .map(|(_, rest)| rest.split('@').next().unwrap_or(rest))
            .unwrap_or("");

        match charset {
            "" if locale == "C" || locale == "POSIX" => Codec::Ascii,
            "" => Codec::default(),
            charset => Codec::from_name(charset).unwrap_or_default(),
        }
    }

    /// Decodes raw bytes to text.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, EncodingError> {
        match self {
            Codec::Utf8 => decode_with(UTF_8, self.name(), bytes),
            Codec::Other(encoding) => decode_with(*encoding, self.name(), bytes),
            Codec::Ascii => {
                let valid = encoding_rs::Encoding::ascii_valid_up_to(bytes);
                match bytes.get(valid) {
                    None => Ok(encoding_rs::mem::decode_latin1(bytes).into_owned()),
                    Some(&byte) => Err(EncodingError::Decode {
                        codec: self.name(),
                        byte,
                        offset: valid,
                    }),
                }
            }
            Codec::Latin1 => Ok(encoding_rs::mem::decode_latin1(bytes).into_owned()),
            Codec::Cp037 => Ok(bytes
                .iter()
                .map(|&b| CP037_DECODE[b as usize] as char)
                .collect()),
        }
    }

    /// Encodes text to raw bytes.  This is the inverse of [`Self::decode()`].
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, EncodingError> {
        match self {
            Codec::Utf8 => Ok(text.as_bytes().to_vec()),
            Codec::Other(encoding) => encode_with(*encoding, text),
            Codec::Ascii if text.is_ascii() => Ok(text.as_bytes().to_vec()),
            Codec::Latin1 if encoding_rs::mem::is_str_latin1(text) => {
                Ok(encoding_rs::mem::encode_latin1_lossy(text).into_owned())
            }
            Codec::Ascii | Codec::Latin1 => Err(self.unencodable(text)),
            Codec::Cp037 if encoding_rs::mem::is_str_latin1(text) => Ok(text
                .chars()
                .map(|ch| CP037_ENCODE[ch as usize])
                .collect()),
            Codec::Cp037 => Err(self.unencodable(text)),
        }
    }

    /// The error for the first character of `text` outside the codec's range.
    fn unencodable(&self, text: &str) -> EncodingError {
        let limit = if *self == Codec::Ascii { 0x80 } else { 0x100 };
        let (offset, ch) = text
            .char_indices()
            .find(|(_, ch)| *ch as u32 >= limit)
            .unwrap_or((0, '\0'));
        EncodingError::Encode {
            codec: self.name(),
            ch,
            offset,
        }
    }
}

fn decode_with(
    encoding: &'static Encoding,
    codec: &'static str,
    bytes: &[u8],
) -> Result<String, EncodingError> {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(bytes.len())
        .unwrap_or(bytes.len());
    let mut text = String::with_capacity(capacity);
    let mut consumed = 0;
    loop {
        let (result, read) =
            decoder.decode_to_string_without_replacement(&bytes[consumed..], &mut text, true);
        consumed += read;
        match result {
            DecoderResult::InputEmpty => return Ok(text),
            DecoderResult::OutputFull => text.reserve(text.capacity().max(16)),
            DecoderResult::Malformed(bad, extra) => {
                let offset = consumed - extra as usize - bad as usize;
                return Err(EncodingError::Decode {
                    codec,
                    byte: bytes[offset],
                    offset,
                });
            }
        }
    }
}

fn encode_with(encoding: &'static Encoding, text: &str) -> Result<Vec<u8>, EncodingError> {
    let mut encoder = encoding.new_encoder();
    let capacity = encoder
        .max_buffer_length_from_utf8_without_replacement(text.len())
        .unwrap_or(text.len());
    let mut bytes = Vec::with_capacity(capacity);
    let mut consumed = 0;
    loop {
        let (result, read) =
            encoder.encode_from_utf8_to_vec_without_replacement(&text[consumed..], &mut bytes, true);
        consumed += read;
        match result {
            EncoderResult::InputEmpty => return Ok(bytes),
            EncoderResult::OutputFull => bytes.reserve(bytes.capacity().max(16)),
            EncoderResult::Unmappable(ch) => {
                return Err(EncodingError::Encode {
                    codec: encoding.name(),
                    ch,
                    offset: consumed - ch.len_utf8(),
                })
            }
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_names() {
        for codec in Codec::ALL {
            assert_eq!(Codec::from_name(codec.name()), Ok(codec));
            assert_eq!(codec.to_string().parse::<Codec>(), Ok(codec));
        }
        assert_eq!(Codec::from_name("UTF_8"), Ok(Codec::Utf8));
        assert_eq!(Codec::from_name("ISO-8859-1"), Ok(Codec::Latin1));
        assert_eq!(Codec::from_name("IBM037"), Ok(Codec::Cp037));
        assert_eq!(
            Codec::from_name("klingon"),
            Err(EncodingError::UnknownCodec("klingon".into()))
        );
    }

    #[test]
    fn test_cp037_table_is_a_bijection() {
        let mut seen = [false; 256];
        for &cp in &CP037_DECODE {
            assert!(!seen[cp as usize]);
            seen[cp as usize] = true;
        }
        for byte in 0..=255u8 {
            assert_eq!(CP037_ENCODE[CP037_DECODE[byte as usize] as usize], byte);
        }
    }

    #[test]
    fn test_cp037() {
        let encoded = Codec::Cp037.encode("README.rst").unwrap();
        assert_eq!(
            encoded,
            [0xd9, 0xc5, 0xc1, 0xc4, 0xd4, 0xc5, 0x4b, 0x99, 0xa2, 0xa3]
        );
        assert_eq!(Codec::Cp037.decode(&encoded).unwrap(), "README.rst");
        assert_eq!(Codec::Cp037.encode("0").unwrap(), [0xf0]);
        assert_eq!(Codec::Cp037.encode(" ").unwrap(), [0x40]);
    }

    #[test]
    fn test_utf8_decode_error() {
        assert_eq!(
            Codec::Utf8.decode(b"ok\xd9\xc5"),
            Err(EncodingError::Decode {
                codec: "utf-8",
                byte: 0xd9,
                offset: 2
            })
        );
    }

    #[test]
    fn test_ascii() {
        assert_eq!(Codec::Ascii.decode(b"plain").unwrap(), "plain");
        assert!(Codec::Ascii.decode(b"caf\xe9").is_err());
        assert_eq!(
            Codec::Ascii.encode("café"),
            Err(EncodingError::Encode {
                codec: "ascii",
                ch: 'é',
                offset: 3
            })
        );
    }

    #[test]
    fn test_latin1() {
        assert_eq!(Codec::Latin1.decode(b"caf\xe9").unwrap(), "café");
        assert_eq!(Codec::Latin1.encode("café").unwrap(), b"caf\xe9");
        assert!(Codec::Latin1.encode("\u{20ac}").is_err());
    }

    #[test]
    fn test_round_trip_all_bytes() {
        let all: Vec<u8> = (0..=255).collect();
        for codec in [Codec::Latin1, Codec::Cp037] {
            let text = codec.decode(&all).unwrap();
            assert_eq!(codec.encode(&text).unwrap(), all);
        }
    }

    #[test]
    fn test_whatwg_labels() {
        let koi8 = Codec::from_name("KOI8-R").unwrap();
        assert_eq!(koi8, Codec::Other(encoding_rs::KOI8_R));
        assert_eq!(koi8.name(), "KOI8-R");

        let encoded = koi8.encode("привет").unwrap();
        assert_eq!(encoded, b"\xd0\xd2\xc9\xd7\xc5\xd4");
        assert_eq!(koi8.decode(&encoded).unwrap(), "привет");
        assert_eq!(
            koi8.encode("caf\u{e9}"),
            Err(EncodingError::Encode {
                codec: "KOI8-R",
                ch: '\u{e9}',
                offset: 3
            })
        );

        let sjis = Codec::from_name("shift_jis").unwrap();
        assert_eq!(sjis.decode(&sjis.encode("日本語.txt").unwrap()).unwrap(), "日本語.txt");
        assert!(matches!(
            sjis.decode(b"ok\x81"),
            Err(EncodingError::Decode { offset: 2, byte: 0x81, .. })
        ));

        assert_eq!(Codec::from_name("unicode-1-1-utf-8"), Ok(Codec::Utf8));
        assert!(Codec::from_name("utf-16le").is_err());
    }
}
