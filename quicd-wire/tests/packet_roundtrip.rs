//! Packet sealing and opening across versions and cipher suites.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use quicd_wire::crypto::{CipherSuite, PacketProtector};
use quicd_wire::frames::{AckFrame, CryptoFrame, Frame, StreamFrame};
use quicd_wire::packet::{
    open_packet, parse_datagram, HandshakePacket, InboundPacket, InitialPacket, LongHeader,
    Packet, PacketNumberLength, ShortHeader, ShortPacket, VersionNegotiationPacket,
};
use quicd_wire::{ConnectionId, EngineConfig, Epoch, Error, Side, Version};

fn cid(bytes: &[u8]) -> ConnectionId {
    ConnectionId::from_slice(bytes).unwrap()
}

fn open_single(datagram: &[u8], protector: &PacketProtector) -> Packet {
    let config = EngineConfig::default();
    let packets = parse_datagram(&Bytes::copy_from_slice(datagram), &config).unwrap();
    assert_eq!(packets.len(), 1);
    let InboundPacket::Protected(protected) = &packets[0] else {
        panic!("expected a protected packet");
    };
    open_packet(protected, protector, None).unwrap()
}

/// Protector pair for an epoch beyond Initial, keyed from fixed secrets.
fn protectors(
    epoch: Epoch,
    suite: CipherSuite,
    version: Version,
) -> (PacketProtector, PacketProtector) {
    let client_secret = vec![0x3a; suite.secret_len()];
    let server_secret = vec![0x7c; suite.secret_len()];

    let mut pair = Vec::new();
    for side in [Side::Client, Side::Server] {
        let mut p = PacketProtector::new(epoch, version);
        p.install_key_set(suite, &client_secret, Side::Client, side).unwrap();
        p.install_key_set(suite, &server_secret, Side::Server, side).unwrap();
        pair.push(p);
    }
    let server = pair.pop().unwrap();
    let client = pair.pop().unwrap();
    (client, server)
}

#[test]
fn test_version_2_initial() {
    let dcid = cid(&[0x42; 8]);
    let client = PacketProtector::initial(&dcid, Version::V2, Side::Client).unwrap();
    let server = PacketProtector::initial(&dcid, Version::V2, Side::Server).unwrap();

    let packet = Packet::Initial(InitialPacket {
        header: LongHeader {
            version: Version::V2,
            dcid: dcid.clone(),
            scid: cid(&[1, 2, 3]),
            packet_number: 7,
            pn_len: PacketNumberLength::ONE,
        },
        token: Bytes::from_static(b"retry-token"),
        frames: vec![
            Frame::Crypto(CryptoFrame {
                offset: 0,
                data: Bytes::from_static(b"client hello bytes"),
            }),
            Frame::Padding(40),
        ],
    });

    let sealed = packet.seal(client.sealer().unwrap()).unwrap().to_bytes();
    assert_eq!(open_single(&sealed, &server), packet);
}

#[test]
fn test_handshake_packet_all_suites() {
    for suite in [
        CipherSuite::Aes128GcmSha256,
        CipherSuite::Aes256GcmSha384,
        CipherSuite::ChaCha20Poly1305Sha256,
    ] {
        let (client, server) = protectors(Epoch::Handshake, suite, Version::V1);
        let packet = Packet::Handshake(HandshakePacket {
            header: LongHeader {
                version: Version::V1,
                dcid: cid(&[9; 12]),
                scid: ConnectionId::empty(),
                packet_number: 0x1234,
                pn_len: PacketNumberLength::TWO,
            },
            frames: vec![
                Frame::Ack(AckFrame {
                    largest_acked: 3,
                    ack_delay: 10,
                    first_ack_range: 3,
                    ..AckFrame::default()
                }),
                Frame::Crypto(CryptoFrame {
                    offset: 300,
                    data: Bytes::from_static(b"finished"),
                }),
            ],
        });

        let sealed = packet.seal(server.sealer().unwrap()).unwrap().to_bytes();
        assert_eq!(open_single(&sealed, &client), packet, "{:?}", suite);
    }
}

#[test]
fn test_short_packet_preserves_bits() {
    let (client, server) =
        protectors(Epoch::Application, CipherSuite::Aes128GcmSha256, Version::V1);
    let packet = Packet::Short(ShortPacket {
        header: ShortHeader {
            dcid: cid(&[5; 8]),
            spin: true,
            key_phase: true,
            packet_number: 1,
            pn_len: PacketNumberLength::ONE,
        },
        frames: vec![Frame::Stream(StreamFrame {
            stream_id: 4,
            offset: 0,
            has_offset: false,
            has_length: false,
            fin: true,
            data: Bytes::from_static(b"GET /\r\n"),
        })],
    });

    let sealed = packet.seal(client.sealer().unwrap()).unwrap().to_bytes();
    assert_eq!(open_single(&sealed, &server), packet);
}

#[test]
fn test_version_negotiation_roundtrip() {
    let config = EngineConfig::default();
    let vn = VersionNegotiationPacket::from_config(cid(&[1, 2, 3, 4]), cid(&[5, 6]), &config);

    let mut buf = BytesMut::new();
    vn.encode(&mut buf);
    assert_eq!(buf[0] & 0x80, 0x80);
    assert_eq!(&buf[1..5], &[0, 0, 0, 0]);

    let packets = parse_datagram(&buf.freeze(), &config).unwrap();
    assert_eq!(packets, vec![InboundPacket::VersionNegotiation(vn.clone())]);
    assert_eq!(vn.select_version(&[0x6b3343cf]), Some(Version::V2));
}

#[test]
fn test_frames_illegal_in_epoch_are_not_sealed() {
    let dcid = cid(&[8; 8]);
    let client = PacketProtector::initial(&dcid, Version::V1, Side::Client).unwrap();
    let packet = Packet::Initial(InitialPacket {
        header: LongHeader {
            version: Version::V1,
            dcid: dcid.clone(),
            scid: dcid,
            packet_number: 0,
            pn_len: PacketNumberLength::ONE,
        },
        token: Bytes::new(),
        frames: vec![Frame::HandshakeDone],
    });
    assert!(matches!(
        packet.seal(client.sealer().unwrap()),
        Err(Error::ProtocolViolation(_))
    ));
}

proptest! {
    #[test]
    fn prop_seal_open_roundtrip(
        data in proptest::collection::vec(any::<u8>(), 1..1000),
        pn in 0u64..(1 << 30),
    ) {
        let (client, server) =
            protectors(Epoch::Application, CipherSuite::ChaCha20Poly1305Sha256, Version::V1);
        let packet = Packet::Short(ShortPacket {
            header: ShortHeader {
                dcid: cid(&[3; 8]),
                spin: false,
                key_phase: false,
                packet_number: pn,
                pn_len: PacketNumberLength::FOUR,
            },
            frames: vec![Frame::Crypto(CryptoFrame {
                offset: 0,
                data: Bytes::from(data),
            })],
        });

        let sealed = packet.seal(server.sealer().unwrap()).unwrap().to_bytes();
        prop_assert_eq!(open_single(&sealed, &client), packet);
    }
}
