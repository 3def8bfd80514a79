//! Benchmarks for packet protection hot paths.
//!
//! These benchmarks measure:
//! - Initial key derivation from a Destination Connection ID
//! - Sealing a full-size 1-RTT packet per cipher suite
//! - Parsing and opening the same packet
//!
//! Run with: cargo bench -p quicd-wire --bench protection

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quicd_wire::crypto::{CipherSuite, PacketProtector};
use quicd_wire::frames::{Frame, StreamFrame};
use quicd_wire::packet::{
    open_packet, parse_datagram, InboundPacket, Packet, PacketNumberLength, ShortHeader,
    ShortPacket,
};
use quicd_wire::{ConnectionId, EngineConfig, Epoch, Side, Version};

const PAYLOAD_LEN: usize = 1200;

fn protectors(suite: CipherSuite) -> (PacketProtector, PacketProtector) {
    let secret_a = vec![0x01; suite.secret_len()];
    let secret_b = vec![0x02; suite.secret_len()];
    let mut client = PacketProtector::new(Epoch::Application, Version::V1);
    let mut server = PacketProtector::new(Epoch::Application, Version::V1);
    for (p, side) in [(&mut client, Side::Client), (&mut server, Side::Server)] {
        p.install_key_set(suite, &secret_a, Side::Client, side).unwrap();
        p.install_key_set(suite, &secret_b, Side::Server, side).unwrap();
    }
    (client, server)
}

fn packet() -> Packet {
    Packet::Short(ShortPacket {
        header: ShortHeader {
            dcid: ConnectionId::from_slice(&[7; 8]).unwrap(),
            spin: false,
            key_phase: false,
            packet_number: 42,
            pn_len: PacketNumberLength::TWO,
        },
        frames: vec![Frame::Stream(StreamFrame {
            stream_id: 0,
            offset: 0,
            has_offset: false,
            has_length: false,
            fin: false,
            data: Bytes::from(vec![0xab; PAYLOAD_LEN]),
        })],
    })
}

/// Benchmark Initial secret and key derivation (per-connection cost)
fn bench_initial_keys(c: &mut Criterion) {
    let dcid = ConnectionId::from_slice(&[0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08]).unwrap();
    c.bench_function("initial_keys", |b| {
        b.iter(|| PacketProtector::initial(black_box(&dcid), Version::V1, Side::Server).unwrap())
    });
}

/// Benchmark sealing a full packet
fn bench_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("seal");
    group.throughput(Throughput::Bytes(PAYLOAD_LEN as u64));
    let packet = packet();

    for suite in [
        CipherSuite::Aes128GcmSha256,
        CipherSuite::Aes256GcmSha384,
        CipherSuite::ChaCha20Poly1305Sha256,
    ] {
        let (client, _) = protectors(suite);
        let sealer = client.sealer().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", suite)), &packet, |b, p| {
            b.iter(|| black_box(p).seal(sealer).unwrap())
        });
    }
    group.finish();
}

/// Benchmark parsing and opening a full packet (receive hot path)
fn bench_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("open");
    group.throughput(Throughput::Bytes(PAYLOAD_LEN as u64));

    for suite in [
        CipherSuite::Aes128GcmSha256,
        CipherSuite::ChaCha20Poly1305Sha256,
    ] {
        let (client, server) = protectors(suite);
        let config = EngineConfig::default();
        let datagram = packet().seal(client.sealer().unwrap()).unwrap().to_bytes();

        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", suite)), &datagram, |b, d| {
            b.iter(|| {
                let packets = parse_datagram(black_box(d), &config).unwrap();
                match &packets[0] {
                    InboundPacket::Protected(p) => open_packet(p, &server, None).unwrap(),
                    InboundPacket::VersionNegotiation(_) => unreachable!(),
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_initial_keys, bench_seal, bench_open);
criterion_main!(benches);
