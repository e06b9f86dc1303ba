//! ServerHello reduction and the JARM hash

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Component recorded for a probe the server did not answer with a ServerHello.
pub const EMPTY_COMPONENT: &str = "|||";

/// Fingerprint length: 10 probes x 3 chars + 32 hex chars of SHA-256.
pub const FINGERPRINT_LEN: usize = 62;

/// Cipher suites in fingerprint index order (1-based).
const CIPHER_INDEX: [u16; 69] = [
    0x0004, 0x0005, 0x0007, 0x000a, 0x0016, 0x002f, 0x0033, 0x0035,
    0x0039, 0x003c, 0x003d, 0x0041, 0x0045, 0x0067, 0x006b, 0x0084,
    0x0088, 0x009a, 0x009c, 0x009d, 0x009e, 0x009f, 0x00ba, 0x00be,
    0x00c0, 0x00c4, 0xc007, 0xc008, 0xc009, 0xc00a, 0xc011, 0xc012,
    0xc013, 0xc014, 0xc023, 0xc024, 0xc027, 0xc028, 0xc02b, 0xc02c,
    0xc02f, 0xc030, 0xc060, 0xc061, 0xc072, 0xc073, 0xc076, 0xc077,
    0xc09c, 0xc09d, 0xc09e, 0xc09f, 0xc0a0, 0xc0a1, 0xc0a2, 0xc0a3,
    0xc0ac, 0xc0ad, 0xc0ae, 0xc0af, 0xcc13, 0xcc14, 0xcca8, 0xcca9,
    0x1301, 0x1302, 0x1303, 0x1304, 0x1305,
];

const HANDSHAKE: u8 = 22;
const SERVER_HELLO: u8 = 2;

/// The reply claimed to be a ServerHello but ended before its cipher suite.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("truncated ServerHello")]
pub struct TruncatedHello;

/// Reduce one server reply to `cipher|version|alpn|extension-types`.
pub fn read_server_hello(data: &[u8]) -> Result<String, TruncatedHello> {
    match data.first() {
        Some(&HANDSHAKE) if data.get(5) == Some(&SERVER_HELLO) => {
            let counter = usize::from(*data.get(43).ok_or(TruncatedHello)?);
            let cipher = data.get(counter + 44..counter + 46).ok_or(TruncatedHello)?;
            let version = &data[9..11];
            let hello_len = usize::from(u16::from_be_bytes([data[3], data[4]]));
            let extensions =
                extension_info(data, counter, hello_len).unwrap_or_else(|| "|".into());
            Ok(format!(
                "{}|{}|{}",
                hex::encode(cipher),
                hex::encode(version),
                extensions
            ))
        }
        // alerts, empty reads and anything else
        _ => Ok(EMPTY_COMPONENT.to_string()),
    }
}

/// `alpn|type-type-...`, or `None` when the extension block is absent or malformed.
fn extension_info(data: &[u8], counter: usize, hello_len: usize) -> Option<String> {
    if *data.get(counter + 47)? == 11 {
        return None;
    }
    if data.get(counter + 50..counter + 53) == Some(&[0x0e, 0xac, 0x0b][..])
        || data.get(82..85) == Some(&[0x0f, 0xf0, 0x0b][..])
    {
        return None;
    }
    if counter + 42 >= hello_len {
        return None;
    }

    let mut count = 49 + counter;
    let length = usize::from(read_u16(data, counter + 47)?);
    let maximum = length + count - 1;

    let mut types = Vec::new();
    let mut alpn: Option<String> = None;
    while count < maximum {
        let ext_type = read_u16(data, count)?;
        let ext_len = usize::from(read_u16(data, count + 2)?);
        types.push(format!("{ext_type:04x}"));
        if ext_len == 0 {
            count += 4;
            continue;
        }
        let start = (count + 4).min(data.len());
        let end = (count + 4 + ext_len).min(data.len());
        let value = &data[start..end];
        if ext_type == 0x0010 && alpn.is_none() {
            // skip list length and the first entry's length byte
            alpn = Some(String::from_utf8_lossy(value.get(3..).unwrap_or_default()).into_owned());
        }
        count += ext_len + 4;
    }

    Some(format!("{}|{}", alpn.unwrap_or_default(), types.join("-")))
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    let b = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

/// Two hex chars: 1-based position of the cipher in the index list.
pub fn cipher_bytes(cipher: &str) -> String {
    if cipher.is_empty() {
        return "00".to_string();
    }
    let position = CIPHER_INDEX
        .iter()
        .position(|c| format!("{c:04x}") == cipher)
        .unwrap_or(CIPHER_INDEX.len());
    format!("{:02x}", position + 1)
}

/// One char for the negotiated version: `0303` -> `d`.
pub fn version_byte(version: &str) -> char {
    version
        .get(3..4)
        .and_then(|d| d.parse::<usize>().ok())
        .and_then(|d| "abcdef".chars().nth(d))
        .unwrap_or('0')
}

/// Hash the ten probe components into the 62-char fingerprint.
pub fn jarm_hash<S: AsRef<str>>(components: &[S]) -> String {
    if components.iter().all(|c| c.as_ref() == EMPTY_COMPONENT) {
        return "0".repeat(FINGERPRINT_LEN);
    }

    let mut fuzzy = String::with_capacity(FINGERPRINT_LEN);
    let mut alpns_and_ext = String::new();
    for component in components {
        let mut parts = component.as_ref().split('|');
        let cipher = parts.next().unwrap_or_default();
        let version = parts.next().unwrap_or_default();
        fuzzy.push_str(&cipher_bytes(cipher));
        fuzzy.push(version_byte(version));
        alpns_and_ext.push_str(parts.next().unwrap_or_default());
        alpns_and_ext.push_str(parts.next().unwrap_or_default());
    }

    let digest = hex::encode(Sha256::digest(alpns_and_ext.as_bytes()));
    fuzzy.push_str(&digest[..32]);
    fuzzy
}
