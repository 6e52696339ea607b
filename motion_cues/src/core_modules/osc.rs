// THEORY:
// Cue listeners in creative-coding setups overwhelmingly speak OSC over UDP,
// so the emitter's default wire format is OSC 1.0. Only the subset the cues
// need is implemented: int32, float32 and string arguments, messages, and
// bundles with the "immediately" time tag.
//
// Layout rules:
// - Every field is big-endian and padded to a multiple of four bytes.
// - Strings are NUL-terminated, then padded with more NULs.
// - A message is address, type-tag string (",ifs..."), then arguments.
// - A bundle is "#bundle", an 8-byte time tag, then size-prefixed elements.

/// The OSC time tag meaning "process immediately".
const IMMEDIATELY: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
}

impl OscArg {
    fn tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Str(_) => 's',
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<u32> for OscArg {
    fn from(v: u32) -> Self {
        OscArg::Int(v.min(i32::MAX as u32) as i32)
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::Str(v.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OscArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        write_padded_str(out, &self.address);

        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(OscArg::tag));
        write_padded_str(out, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Str(s) => write_padded_str(out, s),
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }
}

/// Encodes `messages` as one bundle to be processed immediately.
pub fn encode_bundle(messages: &[OscMessage]) -> Vec<u8> {
    let mut out = bundle_header();
    let mut element = Vec::new();
    for message in messages {
        element.clear();
        message.encode_into(&mut element);
        push_element(&mut out, &element);
    }
    out
}

/// Encodes `messages` in order as one or more bundles of at most `limit`
/// bytes each. A single message larger than `limit` gets a bundle of its own.
pub fn encode_bundles(messages: &[OscMessage], limit: usize) -> Vec<Vec<u8>> {
    let mut bundles = Vec::new();
    let mut current = bundle_header();
    let mut element = Vec::new();
    for message in messages {
        element.clear();
        message.encode_into(&mut element);
        let started = current.len() > BUNDLE_HEADER_LEN;
        if started && current.len() + 4 + element.len() > limit {
            bundles.push(std::mem::replace(&mut current, bundle_header()));
        }
        push_element(&mut current, &element);
    }
    bundles.push(current);
    bundles
}

/// "#bundle" plus the time tag.
const BUNDLE_HEADER_LEN: usize = 16;

fn bundle_header() -> Vec<u8> {
    let mut out = Vec::with_capacity(BUNDLE_HEADER_LEN);
    write_padded_str(&mut out, "#bundle");
    out.extend_from_slice(&IMMEDIATELY.to_be_bytes());
    out
}

fn push_element(out: &mut Vec<u8>, element: &[u8]) {
    out.extend_from_slice(&(element.len() as i32).to_be_bytes());
    out.extend_from_slice(element);
}

fn write_padded_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    // At least one NUL, then up to the next multiple of four.
    let padding = 4 - s.len() % 4;
    out.extend(std::iter::repeat(0u8).take(padding));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_nul_terminated_and_padded() {
        let mut out = Vec::new();
        write_padded_str(&mut out, "abc");
        assert_eq!(out, b"abc\0");

        out.clear();
        write_padded_str(&mut out, "abcd");
        assert_eq!(out, b"abcd\0\0\0\0");
    }

    #[test]
    fn message_layout() {
        let bytes = OscMessage::new("/cues/tick").arg(7i32).arg(0.5f32).encode();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"/cues/tick\0\0");
        expected.extend_from_slice(b",if\0");
        expected.extend_from_slice(&[0, 0, 0, 7]);
        expected.extend_from_slice(&[0x3f, 0x00, 0x00, 0x00]);
        assert_eq!(bytes, expected);
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn message_without_arguments_still_has_type_tags() {
        let bytes = OscMessage::new("/a").encode();
        assert_eq!(bytes, b"/a\0\0,\0\0\0");
    }

    #[test]
    fn bundle_prefixes_each_element_with_its_size() {
        let message = OscMessage::new("/x").arg("hi");
        let bundle = encode_bundle(std::slice::from_ref(&message));

        assert_eq!(&bundle[..8], b"#bundle\0");
        assert_eq!(&bundle[8..16], &1u64.to_be_bytes());
        let size = i32::from_be_bytes(bundle[16..20].try_into().unwrap()) as usize;
        assert_eq!(size, message.encode().len());
        assert_eq!(&bundle[20..], message.encode().as_slice());
    }

    #[test]
    fn bundles_split_at_the_size_limit() {
        let messages: Vec<_> = (0..10i32).map(|i| OscMessage::new("/n").arg(i)).collect();
        // Each element is 4 (size) + 4 ("/n") + 4 (",i") + 4 (int) bytes.
        let bundles = encode_bundles(&messages, BUNDLE_HEADER_LEN + 3 * 16);

        assert_eq!(bundles.len(), 4);
        assert!(bundles.iter().all(|b| b.len() <= BUNDLE_HEADER_LEN + 3 * 16));
        assert_eq!(bundles[3].len(), BUNDLE_HEADER_LEN + 16);
        assert_eq!(encode_bundles(&messages, usize::MAX), vec![encode_bundle(&messages)]);
    }

    #[test]
    fn oversized_message_gets_its_own_bundle() {
        let big = OscMessage::new("/big").arg("x".repeat(100).as_str());
        let small = OscMessage::new("/s");
        let bundles = encode_bundles(&[small.clone(), big, small], 64);
        assert_eq!(bundles.len(), 3);
    }

    #[test]
    fn large_unsigned_values_saturate() {
        assert_eq!(OscArg::from(u32::MAX), OscArg::Int(i32::MAX));
    }
}
