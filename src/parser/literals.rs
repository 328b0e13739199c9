//! Typed literal parsers
//!
//! Pure conversions from the textual tokens handed over by the grammar into
//! canonical values: integers with unit suffixes, IPv4/IPv6 addresses and
//! subnets, TCP flag letters and protocol names. Timestamps live in
//! [`super::time`].

use std::net::Ipv6Addr;
use std::str::FromStr;

use super::error::{CompileError, LiteralKind};

/// IPv4 network with the inclusive address range it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Subnet {
    pub addr: u32,
    pub bits: u8,
    pub low: u32,
    pub high: u32,
}

/// An IPv6 address split the way flow storage keeps it: high and low 64 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Halves {
    pub high: u64,
    pub low: u64,
}

impl Ipv6Halves {
    fn from_u128(value: u128) -> Self {
        Ipv6Halves {
            high: (value >> 64) as u64,
            low: value as u64,
        }
    }
}

impl From<Ipv6Addr> for Ipv6Halves {
    fn from(addr: Ipv6Addr) -> Self {
        Ipv6Halves::from_u128(u128::from(addr))
    }
}

/// IPv6 network; `low` and `high` bound each 64-bit half independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Subnet {
    pub addr: Ipv6Halves,
    pub bits: u8,
    pub low: Ipv6Halves,
    pub high: Ipv6Halves,
}

/// Parse a decimal (or `0x` hexadecimal) integer with an optional unit suffix
///
/// `k`, `m`, `g` and `t` (any case) scale by 10^3, 10^6, 10^9 and 10^12.
pub fn parse_number(text: &str) -> Result<i64, CompileError> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let value = if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CompileError::format(
                LiteralKind::Number,
                text,
                "expected hexadecimal digits after 0x",
            ));
        }
        i64::from_str_radix(hex, 16)
            .map_err(|e| CompileError::format(LiteralKind::Number, text, e.to_string()))?
    } else {
        let digits_end = unsigned
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(unsigned.len());
        let (digits, suffix) = unsigned.split_at(digits_end);

        if digits.is_empty() {
            return Err(CompileError::format(
                LiteralKind::Number,
                text,
                "missing digits",
            ));
        }

        let multiplier: i64 = match suffix {
            "" => 1,
            "k" | "K" => 1_000,
            "m" | "M" => 1_000_000,
            "g" | "G" => 1_000_000_000,
            "t" | "T" => 1_000_000_000_000,
            other => {
                return Err(CompileError::format(
                    LiteralKind::Number,
                    text,
                    format!("unknown suffix '{other}', expected one of k, m, g, t"),
                ))
            }
        };

        digits
            .parse::<i64>()
            .ok()
            .and_then(|n| n.checked_mul(multiplier))
            .ok_or_else(|| CompileError::format(LiteralKind::Number, text, "out of range"))?
    };

    Ok(if negative { -value } else { value })
}

/// Parse a dotted-quad IPv4 address into its big-endian integer form
pub fn parse_ipv4(text: &str) -> Result<u32, CompileError> {
    parse_ipv4_as(text, LiteralKind::Ipv4)
}

fn parse_ipv4_as(text: &str, kind: LiteralKind) -> Result<u32, CompileError> {
    let octets: Vec<&str> = text.split('.').collect();
    if octets.len() != 4 {
        return Err(CompileError::format(
            kind,
            text,
            format!("expected 4 octets, found {}", octets.len()),
        ));
    }

    octets.iter().try_fold(0u32, |acc, octet| {
        if octet.is_empty() || !octet.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CompileError::format(
                kind,
                text,
                format!("'{octet}' is not a number"),
            ));
        }
        let value: u8 = octet.parse().map_err(|_| {
            CompileError::format(kind, text, format!("octet {octet} is out of range 0-255"))
        })?;
        Ok((acc << 8) | u32::from(value))
    })
}

fn split_mask<'a>(text: &'a str, kind: LiteralKind, max: u8) -> Result<(&'a str, u8), CompileError> {
    let (addr, bits) = text
        .split_once('/')
        .ok_or_else(|| CompileError::format(kind, text, "missing '/bits'"))?;

    match bits.parse::<u8>() {
        Ok(bits) if bits <= max => Ok((addr, bits)),
        _ => Err(CompileError::format(
            kind,
            text,
            format!("mask width '{bits}' must be between 0 and {max}"),
        )),
    }
}

fn ipv4_mask(bits: u8) -> u32 {
    match bits {
        0 => 0,
        bits => u32::MAX << (32 - u32::from(bits)),
    }
}

fn ipv6_mask(bits: u8) -> u128 {
    match bits {
        0 => 0,
        bits => u128::MAX << (128 - u32::from(bits)),
    }
}

/// Parse `a.b.c.d/bits` and derive the inclusive range of the network
pub fn parse_ipv4_subnet(text: &str) -> Result<Ipv4Subnet, CompileError> {
    let (addr, bits) = split_mask(text, LiteralKind::Ipv4Subnet, 32)?;
    let addr = parse_ipv4_as(addr, LiteralKind::Ipv4Subnet)?;
    let mask = ipv4_mask(bits);

    Ok(Ipv4Subnet {
        addr,
        bits,
        low: addr & mask,
        high: addr | !mask,
    })
}

/// Parse an IPv6 address in any standard textual notation
pub fn parse_ipv6(text: &str) -> Result<Ipv6Halves, CompileError> {
    parse_ipv6_as(text, LiteralKind::Ipv6)
}

fn parse_ipv6_as(text: &str, kind: LiteralKind) -> Result<Ipv6Halves, CompileError> {
    Ipv6Addr::from_str(text)
        .map(Ipv6Halves::from)
        .map_err(|e| CompileError::format(kind, text, e.to_string()))
}

/// Parse `addr/bits` for IPv6; the mask is split across both halves
pub fn parse_ipv6_subnet(text: &str) -> Result<Ipv6Subnet, CompileError> {
    let (addr, bits) = split_mask(text, LiteralKind::Ipv6Subnet, 128)?;
    let addr = Ipv6Addr::from_str(addr)
        .map(u128::from)
        .map_err(|e| CompileError::format(LiteralKind::Ipv6Subnet, text, e.to_string()))?;
    let mask = ipv6_mask(bits);

    Ok(Ipv6Subnet {
        addr: Ipv6Halves::from_u128(addr),
        bits,
        low: Ipv6Halves::from_u128(addr & mask),
        high: Ipv6Halves::from_u128(addr | !mask),
    })
}

/// TCP flag letters and the bit each one sets
const TCP_FLAGS: &[(char, u8)] = &[
    ('F', 0x01),
    ('S', 0x02),
    ('R', 0x04),
    ('P', 0x08),
    ('A', 0x10),
    ('U', 0x20),
    ('E', 0x40),
    ('C', 0x80),
];

/// Convert flag letters (`FSRPAUEC`, any order and case) into a bit mask
pub fn parse_flags(text: &str) -> Result<i64, CompileError> {
    if text.is_empty() {
        return Err(CompileError::format(LiteralKind::Flags, text, "no flags given"));
    }

    text.chars().try_fold(0i64, |mask, letter| {
        let upper = letter.to_ascii_uppercase();
        TCP_FLAGS
            .iter()
            .find(|(flag, _)| *flag == upper)
            .map(|(_, bit)| mask | i64::from(*bit))
            .ok_or_else(|| {
                CompileError::format(
                    LiteralKind::Flags,
                    text,
                    format!("unknown flag '{letter}', expected letters from FSRPAUEC"),
                )
            })
    })
}

/// Well-known IP protocol numbers (IANA)
const PROTOCOLS: &[(&str, i64)] = &[
    ("hopopt", 0),
    ("icmp", 1),
    ("igmp", 2),
    ("ggp", 3),
    ("ipencap", 4),
    ("st", 5),
    ("tcp", 6),
    ("egp", 8),
    ("igp", 9),
    ("pup", 12),
    ("udp", 17),
    ("hmp", 20),
    ("xns-idp", 22),
    ("rdp", 27),
    ("iso-tp4", 29),
    ("dccp", 33),
    ("xtp", 36),
    ("ddp", 37),
    ("idpr-cmtp", 38),
    ("ipv6", 41),
    ("ipv6-route", 43),
    ("ipv6-frag", 44),
    ("idrp", 45),
    ("rsvp", 46),
    ("gre", 47),
    ("esp", 50),
    ("ah", 51),
    ("skip", 57),
    ("icmpv6", 58),
    ("ipv6-icmp", 58),
    ("ipv6-nonxt", 59),
    ("ipv6-opts", 60),
    ("rspf", 73),
    ("vmtp", 81),
    ("eigrp", 88),
    ("ospf", 89),
    ("ax.25", 93),
    ("ipip", 94),
    ("etherip", 97),
    ("encap", 98),
    ("pim", 103),
    ("ipcomp", 108),
    ("vrrp", 112),
    ("l2tp", 115),
    ("isis", 124),
    ("sctp", 132),
    ("fc", 133),
    ("mobility-header", 135),
    ("udplite", 136),
    ("mpls-in-ip", 137),
    ("manet", 138),
    ("hip", 139),
    ("shim6", 140),
    ("wesp", 141),
    ("rohc", 142),
];

/// Look up a protocol by name (case-insensitive)
pub fn resolve_protocol_name(name: &str) -> Result<i64, CompileError> {
    let lower = name.to_ascii_lowercase();
    PROTOCOLS
        .iter()
        .find(|(proto, _)| *proto == lower)
        .map(|(_, number)| *number)
        .ok_or_else(|| CompileError::UnknownProtocol {
            name: name.to_string(),
        })
}
