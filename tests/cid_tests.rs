//! CID framing: small-CID Add-CID routing and large-CID SDVL framing
//! where the CID bytes follow the packet type octet.

mod common;

use std::sync::Arc;

use common::{seal_and_payload, with_large_cid, UdpV4Flow};
use rohcdec::crc::CrcCalculators;
use rohcdec::engine::DecompressorConfig;
use rohcdec::time::SystemClock;
use rohcdec::{CidType, ContextId, DecompressionError, RohcDecompressor, RohcError};

const PAYLOAD: &[u8] = b"cid-payload";

fn large_cid_engine(max_cid: u16) -> RohcDecompressor {
    let config = DecompressorConfig {
        cid_type: CidType::Large,
        max_cid: ContextId::new(max_cid),
        ..Default::default()
    };
    RohcDecompressor::new(config, Arc::new(SystemClock)).unwrap()
}

#[test]
fn large_cid_routes_after_type_octet() {
    let mut engine = large_cid_engine(1000);
    let crcs = CrcCalculators::new();
    let flow = UdpV4Flow::default();

    // CID 300 SDVL-encodes as 0x81 0x2C, spliced after the type octet;
    // the CRC-8 covers the CID bytes.
    let cid_sdvl = [0x81u8, 0x2C];
    let ir = seal_and_payload(with_large_cid(&cid_sdvl, &flow.ir_header(40)), 4, PAYLOAD);
    let out = engine.decompress(&ir).expect("large-CID IR");
    assert_eq!(out, flow.packet_at(40, PAYLOAD));

    assert!(engine.contexts().get_context(ContextId::new(300)).is_ok());
    assert!(engine.contexts().get_context(ContextId::new(0)).is_err());

    let uo0 = with_large_cid(&cid_sdvl, &flow.build_uo0(&crcs, 41, PAYLOAD));
    let out = engine.decompress(&uo0).unwrap();
    assert_eq!(out, flow.packet_at(41, PAYLOAD));
    assert_eq!(
        engine
            .contexts()
            .get_context(ContextId::new(300))
            .unwrap()
            .sn_ref,
        41
    );
}

#[test]
fn large_cid_zero_is_one_sdvl_byte() {
    let mut engine = large_cid_engine(1000);
    let flow = UdpV4Flow::default();

    let ir = seal_and_payload(with_large_cid(&[0x00], &flow.ir_header(5)), 3, PAYLOAD);
    engine.decompress(&ir).unwrap();
    assert!(engine.contexts().get_context(ContextId::new(0)).is_ok());
}

#[test]
fn cid_above_max_is_rejected() {
    let mut engine = large_cid_engine(256);
    let flow = UdpV4Flow::default();

    // CID 300 exceeds max_cid 256.
    let ir = seal_and_payload(with_large_cid(&[0x81, 0x2C], &flow.ir_header(5)), 4, PAYLOAD);
    assert!(matches!(
        engine.decompress(&ir),
        Err(RohcError::Decompression(DecompressionError::CidOutOfRange { .. }))
    ));
}

#[test]
fn truncated_sdvl_cid_is_malformed() {
    let mut engine = large_cid_engine(1000);
    // Type octet followed by a two-byte SDVL prefix with no second byte.
    let packet = [0xFD, 0x81];
    assert!(matches!(
        engine.decompress(&packet),
        Err(RohcError::Parsing(_))
    ));
}

#[test]
fn small_cid_contexts_do_not_collide() {
    let mut engine = RohcDecompressor::with_defaults();
    let crcs = CrcCalculators::new();

    // Fifteen distinct flows, one per Add-CID value.
    let flows: Vec<UdpV4Flow> = (1u16..=15)
        .map(|cid| UdpV4Flow {
            ip_id_offset: 100 * cid,
            ..Default::default()
        })
        .collect();

    for (idx, flow) in flows.iter().enumerate() {
        let cid = (idx + 1) as u8;
        let ir = seal_and_payload(
            common::with_add_cid(cid, &flow.ir_header(cid as u16 * 10)),
            3,
            PAYLOAD,
        );
        engine.decompress(&ir).unwrap();
    }
    assert_eq!(engine.contexts().context_count(), 15);

    for (idx, flow) in flows.iter().enumerate() {
        let cid = (idx + 1) as u8;
        let sn = cid as u16 * 10 + 1;
        let uo0 = common::with_add_cid(cid, &flow.build_uo0(&crcs, sn, PAYLOAD));
        let out = engine.decompress(&uo0).unwrap();
        assert_eq!(out, flow.packet_at(sn, PAYLOAD), "flow {cid}");
    }
}
