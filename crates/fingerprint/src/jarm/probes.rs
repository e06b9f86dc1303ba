//! The ten JARM ClientHello probes
//!
//! Each probe varies the offered version, cipher list and order, GREASE,
//! ALPN list and extension order. Packets are assembled byte by byte; the
//! client random, session id and key share are fresh random bytes per probe.

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    Tls11,
    Tls12,
    Tls13,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherList {
    All,
    /// `All` without the TLS 1.3 suites.
    NoTls13,
}

/// Reordering applied to ciphers, ALPN entries and supported versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Forward,
    Reverse,
    TopHalf,
    BottomHalf,
    MiddleOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlpnList {
    Standard,
    Rare,
}

/// Which supported_versions extension variant is offered, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSupport {
    None,
    Tls12,
    Tls13,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub version: TlsVersion,
    pub ciphers: CipherList,
    pub cipher_order: Order,
    pub grease: bool,
    pub alpn: AlpnList,
    pub support: VersionSupport,
    pub extension_order: Order,
}

const fn probe(
    version: TlsVersion,
    ciphers: CipherList,
    cipher_order: Order,
    grease: bool,
    alpn: AlpnList,
    support: VersionSupport,
    extension_order: Order,
) -> Probe {
    Probe {
        version,
        ciphers,
        cipher_order,
        grease,
        alpn,
        support,
        extension_order,
    }
}

use AlpnList::{Rare, Standard};
use CipherList::{All, NoTls13};
use Order::{BottomHalf, Forward, MiddleOut, Reverse, TopHalf};
use TlsVersion::{Tls11, Tls12, Tls13};

/// Probe battery, in the order the responses are hashed.
pub const PROBES: [Probe; 10] = [
    probe(Tls12, All, Forward, false, Standard, VersionSupport::Tls12, Reverse),
    probe(Tls12, All, Reverse, false, Standard, VersionSupport::Tls12, Forward),
    probe(Tls12, All, TopHalf, false, Standard, VersionSupport::None, Forward),
    probe(Tls12, All, BottomHalf, false, Rare, VersionSupport::None, Forward),
    probe(Tls12, All, MiddleOut, true, Rare, VersionSupport::None, Reverse),
    probe(Tls11, All, Forward, false, Standard, VersionSupport::None, Forward),
    probe(Tls13, All, Forward, false, Standard, VersionSupport::Tls13, Reverse),
    probe(Tls13, All, Reverse, false, Standard, VersionSupport::Tls13, Forward),
    probe(Tls13, NoTls13, Forward, false, Standard, VersionSupport::Tls13, Forward),
    probe(Tls13, All, MiddleOut, true, Standard, VersionSupport::Tls13, Reverse),
];

const ALL_CIPHERS: [u16; 69] = [
    0x0016, 0x0033, 0x0067, 0xc09e, 0xc0a2, 0x009e, 0x0039, 0x006b,
    0xc09f, 0xc0a3, 0x009f, 0x0045, 0x00be, 0x0088, 0x00c4, 0x009a,
    0xc008, 0xc009, 0xc023, 0xc0ac, 0xc0ae, 0xc02b, 0xc00a, 0xc024,
    0xc0ad, 0xc0af, 0xc02c, 0xc072, 0xc073, 0xcca9, 0x1302, 0x1301,
    0xcc14, 0xc007, 0xc012, 0xc013, 0xc027, 0xc02f, 0xc014, 0xc028,
    0xc030, 0xc060, 0xc061, 0xc076, 0xc077, 0xcca8, 0x1305, 0x1304,
    0x1303, 0xcc13, 0xc011, 0x000a, 0x002f, 0x003c, 0xc09c, 0xc0a0,
    0x009c, 0x0035, 0x003d, 0xc09d, 0xc0a1, 0x009d, 0x0041, 0x00ba,
    0x0084, 0x00c0, 0x0007, 0x0004, 0x0005,
];

const TLS13_CIPHERS: [u16; 5] = [0x1301, 0x1302, 0x1303, 0x1304, 0x1305];

const GREASE: [u16; 16] = [
    0x0a0a, 0x1a1a, 0x2a2a, 0x3a3a, 0x4a4a, 0x5a5a, 0x6a6a, 0x7a7a,
    0x8a8a, 0x9a9a, 0xaaaa, 0xbaba, 0xcaca, 0xdada, 0xeaea, 0xfafa,
];

const ALPN_STANDARD: [&str; 9] = [
    "http/0.9", "http/1.0", "http/1.1", "spdy/1", "spdy/2", "spdy/3", "h2", "h2c", "hq",
];
const ALPN_RARE: [&str; 7] = ["http/0.9", "http/1.0", "spdy/1", "spdy/2", "spdy/3", "h2c", "hq"];

// fixed extensions, id + body
const EXTENDED_MASTER_SECRET: [u8; 4] = [0x00, 0x17, 0x00, 0x00];
const MAX_FRAGMENT_LENGTH: [u8; 5] = [0x00, 0x01, 0x00, 0x01, 0x01];
const RENEGOTIATION_INFO: [u8; 5] = [0xff, 0x01, 0x00, 0x01, 0x00];
const SUPPORTED_GROUPS: [u8; 14] = [
    0x00, 0x0a, 0x00, 0x0a, 0x00, 0x08, 0x00, 0x1d, 0x00, 0x17, 0x00, 0x18, 0x00, 0x19,
];
const EC_POINT_FORMATS: [u8; 6] = [0x00, 0x0b, 0x00, 0x02, 0x01, 0x00];
const SESSION_TICKET: [u8; 4] = [0x00, 0x23, 0x00, 0x00];
const SIGNATURE_ALGORITHMS: [u8; 24] = [
    0x00, 0x0d, 0x00, 0x14, 0x00, 0x12, 0x04, 0x03, 0x08, 0x04, 0x04, 0x01, 0x05, 0x03, 0x08,
    0x05, 0x05, 0x01, 0x08, 0x06, 0x06, 0x01, 0x02, 0x01,
];
const PSK_KEY_EXCHANGE_MODES: [u8; 6] = [0x00, 0x2d, 0x00, 0x02, 0x01, 0x01];

fn grease() -> u16 {
    GREASE[rand::thread_rng().gen_range(0..GREASE.len())]
}

/// Reorder a list the way a probe asks for.
pub fn mung<T: Clone>(items: &[T], order: Order) -> Vec<T> {
    let len = items.len();
    match order {
        Order::Forward => items.to_vec(),
        Order::Reverse => items.iter().rev().cloned().collect(),
        Order::BottomHalf => {
            let start = if len % 2 == 1 { len / 2 + 1 } else { len / 2 };
            items[start..].to_vec()
        }
        Order::TopHalf => {
            let mut out = Vec::with_capacity(len / 2 + 1);
            if len % 2 == 1 {
                out.push(items[len / 2].clone());
            }
            out.extend(mung(&mung(items, Order::Reverse), Order::BottomHalf));
            out
        }
        Order::MiddleOut => {
            let middle = len / 2;
            let mut out = Vec::with_capacity(len);
            if len % 2 == 1 {
                out.push(items[middle].clone());
                for i in 1..=middle {
                    out.push(items[middle + i].clone());
                    out.push(items[middle - i].clone());
                }
            } else {
                for i in 1..=middle {
                    out.push(items[middle - 1 + i].clone());
                    out.push(items[middle - i].clone());
                }
            }
            out
        }
    }
}

#[inline]
fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Extension data lengths are bounded well below u16::MAX by construction.
#[inline]
fn len16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

impl Probe {
    /// Full TLS record carrying this probe's ClientHello. `host` goes into SNI.
    pub fn client_hello(&self, host: &str) -> Vec<u8> {
        let (record_version, hello_version): (u16, u16) = match self.version {
            TlsVersion::Tls11 => (0x0302, 0x0302),
            TlsVersion::Tls12 => (0x0303, 0x0303),
            // real 1.3 clients advertise 1.2 and negotiate via supported_versions
            TlsVersion::Tls13 => (0x0301, 0x0303),
        };

        let mut hello = Vec::with_capacity(512);
        put_u16(&mut hello, hello_version);
        hello.extend_from_slice(&rand::random::<[u8; 32]>());
        hello.push(32);
        hello.extend_from_slice(&rand::random::<[u8; 32]>());

        let ciphers = self.cipher_suites();
        put_u16(&mut hello, len16(ciphers.len() * 2));
        for c in ciphers {
            put_u16(&mut hello, c);
        }
        // one compression method: null
        hello.extend_from_slice(&[0x01, 0x00]);
        hello.extend_from_slice(&self.extensions(host));

        let mut handshake = Vec::with_capacity(hello.len() + 4);
        handshake.push(0x01);
        let hello_len = u32::try_from(hello.len()).unwrap_or(u32::MAX).to_be_bytes();
        handshake.extend_from_slice(&hello_len[1..]);
        handshake.extend_from_slice(&hello);

        let mut record = Vec::with_capacity(handshake.len() + 5);
        record.push(0x16);
        put_u16(&mut record, record_version);
        put_u16(&mut record, len16(handshake.len()));
        record.extend_from_slice(&handshake);
        record
    }

    fn cipher_suites(&self) -> Vec<u16> {
        let base: Vec<u16> = match self.ciphers {
            CipherList::All => ALL_CIPHERS.to_vec(),
            CipherList::NoTls13 => ALL_CIPHERS
                .iter()
                .copied()
                .filter(|c| !TLS13_CIPHERS.contains(c))
                .collect(),
        };
        let mut ciphers = mung(&base, self.cipher_order);
        if self.grease {
            ciphers.insert(0, grease());
        }
        ciphers
    }

    fn extensions(&self, host: &str) -> Vec<u8> {
        let mut ext = Vec::with_capacity(256);
        if self.grease {
            put_u16(&mut ext, grease());
            put_u16(&mut ext, 0);
        }
        server_name(&mut ext, host);
        ext.extend_from_slice(&EXTENDED_MASTER_SECRET);
        ext.extend_from_slice(&MAX_FRAGMENT_LENGTH);
        ext.extend_from_slice(&RENEGOTIATION_INFO);
        ext.extend_from_slice(&SUPPORTED_GROUPS);
        ext.extend_from_slice(&EC_POINT_FORMATS);
        ext.extend_from_slice(&SESSION_TICKET);
        self.alpn(&mut ext);
        ext.extend_from_slice(&SIGNATURE_ALGORITHMS);
        self.key_share(&mut ext);
        ext.extend_from_slice(&PSK_KEY_EXCHANGE_MODES);
        if self.version == TlsVersion::Tls13 || self.support == VersionSupport::Tls12 {
            self.supported_versions(&mut ext);
        }

        let mut out = Vec::with_capacity(ext.len() + 2);
        put_u16(&mut out, len16(ext.len()));
        out.extend_from_slice(&ext);
        out
    }

    fn alpn(&self, ext: &mut Vec<u8>) {
        let names: &[&str] = match self.alpn {
            AlpnList::Standard => &ALPN_STANDARD,
            AlpnList::Rare => &ALPN_RARE,
        };
        let names = mung(names, self.extension_order);

        let mut list = Vec::new();
        for name in names {
            list.push(name.len() as u8);
            list.extend_from_slice(name.as_bytes());
        }
        put_u16(ext, 0x0010);
        put_u16(ext, len16(list.len() + 2));
        put_u16(ext, len16(list.len()));
        ext.extend_from_slice(&list);
    }

    fn key_share(&self, ext: &mut Vec<u8>) {
        let mut share = Vec::with_capacity(48);
        if self.grease {
            put_u16(&mut share, grease());
            share.extend_from_slice(&[0x00, 0x01, 0x00]);
        }
        // x25519
        put_u16(&mut share, 0x001d);
        put_u16(&mut share, 32);
        share.extend_from_slice(&rand::random::<[u8; 32]>());

        put_u16(ext, 0x0033);
        put_u16(ext, len16(share.len() + 2));
        put_u16(ext, len16(share.len()));
        ext.extend_from_slice(&share);
    }

    fn supported_versions(&self, ext: &mut Vec<u8>) {
        let offered: &[u16] = if self.support == VersionSupport::Tls12 {
            &[0x0301, 0x0302, 0x0303]
        } else {
            &[0x0301, 0x0302, 0x0303, 0x0304]
        };
        let mut versions = mung(offered, self.extension_order);
        if self.grease {
            versions.insert(0, grease());
        }

        let n = versions.len() * 2;
        put_u16(ext, 0x002b);
        put_u16(ext, len16(n + 1));
        ext.push(n as u8);
        for v in versions {
            put_u16(ext, v);
        }
    }
}

fn server_name(ext: &mut Vec<u8>, host: &str) {
    let name = host.as_bytes();
    put_u16(ext, 0x0000);
    put_u16(ext, len16(name.len() + 5));
    put_u16(ext, len16(name.len() + 3));
    // host_name
    ext.push(0x00);
    put_u16(ext, len16(name.len()));
    ext.extend_from_slice(name);
}
