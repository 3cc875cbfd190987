use std::hint::black_box;
use std::sync::LazyLock as Lazy;

use criterion::{Criterion, criterion_group, criterion_main};
use lacp_utils::mac_addr::MacAddr;
use lacpd::packet::{Lacpdu, MarkerPdu, PduParty, StateFlags};
use lacpd::types::SystemId;

static LACPDU: Lazy<Lacpdu> = Lazy::new(|| Lacpdu {
    actor: PduParty {
        system: SystemId {
            priority: 1,
            mac: MacAddr::from([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]),
        },
        key: 1,
        port_priority: 32768,
        port: 1,
        state: StateFlags::ACTIVITY | StateFlags::AGGREGATION | StateFlags::SYNCHRONIZATION,
    },
    partner: PduParty {
        system: SystemId {
            priority: 32768,
            mac: MacAddr::from([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
        },
        key: 7,
        port_priority: 32768,
        port: 101,
        state: StateFlags::ACTIVITY
            | StateFlags::AGGREGATION
            | StateFlags::SYNCHRONIZATION
            | StateFlags::COLLECTING
            | StateFlags::DISTRIBUTING,
    },
    collector_max_delay: 0,
});

static MARKER: Lazy<MarkerPdu> = Lazy::new(|| MarkerPdu {
    requester_port: 1,
    requester_system: MacAddr::from([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]),
    requester_transaction_id: 1,
});

fn lacpdu_encode(n: u64) {
    for _ in 0..n {
        black_box(LACPDU.encode());
    }
}

fn lacpdu_decode(n: u64) {
    let frame = LACPDU.encode();
    for _ in 0..n {
        black_box(Lacpdu::decode(&frame).unwrap());
    }
}

fn marker_encode(n: u64) {
    for _ in 0..n {
        black_box(MARKER.encode());
    }
}

fn marker_decode(n: u64) {
    let frame = MARKER.encode();
    for _ in 0..n {
        black_box(MarkerPdu::decode(&frame).unwrap());
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("LACPDU encode", |b| b.iter(|| lacpdu_encode(black_box(10000))));
    c.bench_function("LACPDU decode", |b| b.iter(|| lacpdu_decode(black_box(10000))));
    c.bench_function("Marker encode", |b| b.iter(|| marker_encode(black_box(10000))));
    c.bench_function("Marker decode", |b| b.iter(|| marker_decode(black_box(10000))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
