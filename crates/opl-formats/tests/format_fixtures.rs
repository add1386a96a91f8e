//! Integration tests for the IMF and DRO parsers against the fixture files,
//! including damaged copies of them.

use opl_formats::{DroReader, FormatError, ImfReader};
use opl_ir::{Bank, Delay, Instruction};
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures")
}

fn load_fixture(name: &str) -> Vec<u8> {
    let path = fixtures_dir().join(name);
    fs::read(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}

/// Magic, version, and the fixed v2 fields before the code map.
const DRO_FIXED_HEADER: usize = 26;

fn parse_dro(data: &[u8]) -> Result<Vec<Instruction>, FormatError> {
    DroReader::new(Cursor::new(data.to_vec()))?.collect()
}

fn parse_imf(data: &[u8]) -> Vec<Instruction> {
    ImfReader::new(Cursor::new(data.to_vec()))
        .unwrap()
        .map(Result::unwrap)
        .collect()
}

#[test]
fn dro_delays_decode_to_milliseconds() {
    let instrs = parse_dro(&load_fixture("dro/reference.dro")).unwrap();
    let total_ms: u32 = instrs
        .iter()
        .filter_map(|i| match i {
            Instruction::Delay(d) => Some(d.amount),
            _ => None,
        })
        .sum();
    assert_eq!(total_ms, 883);
    // the fixture carries one long delay of (1 + 1) * 256 ms
    assert!(instrs.contains(&Instruction::Delay(Delay::millis(512))));
}

#[test]
fn dro_writes_use_code_map_registers() {
    let instrs = parse_dro(&load_fixture("dro/reference.dro")).unwrap();
    for instr in &instrs {
        if let Instruction::RegisterWrite { bank, register, .. } = instr {
            assert!([0xA0, 0xB0, 0x20].contains(register), "register {register:#x}");
            if *bank == Bank::High {
                assert_eq!(*register, 0xA0);
            }
        }
    }
}

#[test]
fn dro_truncated_header() {
    let data = load_fixture("dro/reference.dro");
    for len in [4, 8, 12, DRO_FIXED_HEADER - 1] {
        assert!(
            matches!(parse_dro(&data[..len]), Err(FormatError::UnexpectedEof)),
            "truncated to {len} bytes"
        );
    }
}

#[test]
fn dro_truncated_code_map() {
    let data = load_fixture("dro/reference.dro");
    let err = parse_dro(&data[..DRO_FIXED_HEADER + 1]).unwrap_err();
    assert!(matches!(
        err,
        FormatError::CodeMapTruncated {
            declared: 3,
            available: 1
        }
    ));
}

#[test]
fn dro_truncated_pairs_end_the_stream() {
    let data = load_fixture("dro/reference.dro");
    let full = parse_dro(&data).unwrap();
    // ten whole pairs and half of the eleventh
    let cut = DRO_FIXED_HEADER + 3 + 10 * 2 + 1;
    let partial = parse_dro(&data[..cut]).unwrap();
    assert_eq!(partial, full[..10]);
}

#[test]
fn dro_wrong_magic() {
    let mut data = load_fixture("dro/reference.dro");
    data[0] = b'X';
    assert!(parse_dro(&data).is_err());
}

#[test]
fn imf_truncated_body_ends_the_stream() {
    let data = load_fixture("imf/fanfare.imf");
    let full = parse_imf(&data);
    // length prefix, ten events, half of the eleventh
    let partial = parse_imf(&data[..2 + 10 * 4 + 2]);
    assert_eq!(partial.len(), 10);
    assert_eq!(partial, full[..10]);
}

#[test]
fn imf_footer_is_not_played() {
    let data = load_fixture("imf/fanfare.imf");
    let declared = u16::from_le_bytes([data[0], data[1]]) as usize;
    assert!(data.len() > 2 + declared, "fixture should have a footer");
    assert_eq!(parse_imf(&data), parse_imf(&data[..2 + declared]));
}
