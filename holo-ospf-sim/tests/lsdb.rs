//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::net::Ipv4Addr;
use std::sync::LazyLock as Lazy;

use const_addrs::ip4;
use holo_ospf_sim::lsdb::{
    LSA_INIT_SEQ_NO, LSA_MAX_AGE, LSA_MAX_AGE_DIFF, LSA_MAX_SEQ_NO,
    lsa_compare,
};
use holo_ospf_sim::packet::Options;
use holo_ospf_sim::packet::lsa::{
    LsaHdr, LsaRouter, LsaType, bandwidth_decode, bandwidth_encode,
    bandwidth_quantize,
};

const ADV_RTR: Ipv4Addr = ip4!("1.1.1.1");

static SAMPLES: Lazy<Vec<LsaHdr>> = Lazy::new(|| {
    let mut samples = vec![];
    for seq_no in [LSA_INIT_SEQ_NO, 0x80000002, 0, 1, LSA_MAX_SEQ_NO] {
        for age in [0, 1, 899, 900, 1800, LSA_MAX_AGE - 1, LSA_MAX_AGE] {
            samples.push(lsa_hdr(age, seq_no));
        }
    }
    samples
});

//
// Helper functions.
//

fn lsa_hdr(age: u16, seq_no: u32) -> LsaHdr {
    LsaHdr::new(
        age,
        Options::E,
        LsaType::Router,
        ADV_RTR,
        ADV_RTR,
        seq_no,
        LsaHdr::LENGTH + LsaRouter::BASE_LENGTH,
    )
}

//
// Tests.
//

#[test]
fn lsa_compare_seqno() {
    let a = lsa_hdr(100, LSA_INIT_SEQ_NO + 1);
    let b = lsa_hdr(10, LSA_INIT_SEQ_NO);
    assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
    assert_eq!(lsa_compare(&b, &a), Ordering::Less);

    // Sequence numbers are compared as signed integers.
    let a = lsa_hdr(0, LSA_MAX_SEQ_NO);
    let b = lsa_hdr(0, LSA_INIT_SEQ_NO);
    assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
}

#[test]
fn lsa_compare_maxage() {
    let a = lsa_hdr(LSA_MAX_AGE, LSA_INIT_SEQ_NO);
    for age in [0, 1000, LSA_MAX_AGE - 1] {
        let b = lsa_hdr(age, LSA_INIT_SEQ_NO);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
        assert_eq!(lsa_compare(&b, &a), Ordering::Less);
    }
    assert_eq!(lsa_compare(&a, &a), Ordering::Equal);

    // MaxAge wins over higher sequence numbers too.
    for seq_no in [LSA_INIT_SEQ_NO + 1, LSA_MAX_SEQ_NO] {
        let b = lsa_hdr(0, seq_no);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
        assert_eq!(lsa_compare(&b, &a), Ordering::Less);
    }

    // Between two MaxAge instances, the sequence number decides.
    let b = lsa_hdr(LSA_MAX_AGE, LSA_INIT_SEQ_NO + 1);
    assert_eq!(lsa_compare(&a, &b), Ordering::Less);
}

#[test]
fn lsa_compare_age() {
    // A large enough age difference makes the younger instance more recent.
    let a = lsa_hdr(0, LSA_INIT_SEQ_NO);
    let b = lsa_hdr(LSA_MAX_AGE_DIFF, LSA_INIT_SEQ_NO);
    assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
    assert_eq!(lsa_compare(&b, &a), Ordering::Less);

    // Smaller differences are ignored.
    let b = lsa_hdr(LSA_MAX_AGE_DIFF - 1, LSA_INIT_SEQ_NO);
    assert_eq!(lsa_compare(&a, &b), Ordering::Equal);
    assert_eq!(lsa_compare(&b, &a), Ordering::Equal);
}

#[test]
fn lsa_compare_antisymmetry() {
    for a in SAMPLES.iter() {
        for b in SAMPLES.iter() {
            assert_eq!(
                lsa_compare(a, b),
                lsa_compare(b, a).reverse(),
                "{a:?} {b:?}"
            );
        }
    }
}

#[test]
fn bandwidth_encoding() {
    let metric = bandwidth_encode(1_000_000);
    assert_eq!(metric, (2 << 13) | 1953);
    assert_eq!(bandwidth_decode(metric), 999_936);

    assert_eq!(bandwidth_encode(0), 0);
    assert_eq!(bandwidth_decode(0), 0);

    // Values too large for the encoding saturate.
    assert_eq!(bandwidth_encode(u64::MAX), 0xffff);
}

#[test]
fn bandwidth_quantization() {
    for (value, quantized) in [
        (1_000_000, 999_936),
        (5_000_000, 4_997_120),
        (6_000_000, 5_996_544),
        (10_000_000, 9_998_336),
    ] {
        assert_eq!(bandwidth_quantize(value), quantized);
    }

    for value in [0, 7, 8, 65_535, 1_000_000, 123_456_789, 10_000_000_000] {
        let quantized = bandwidth_quantize(value);
        assert!(quantized <= value);
        assert_eq!(bandwidth_quantize(quantized), quantized);
    }
}
