//! RFC 9001 Appendix A Test Vectors
//!
//! Opens the protected client Initial packet of Appendix A.2 with keys
//! derived from its Destination Connection ID and checks that sealing the
//! decoded packet again reproduces it bit for bit.

use bytes::Bytes;
use quicd_wire::crypto::{initial_secrets, CipherSuite, PacketProtector};
use quicd_wire::frames::Frame;
use quicd_wire::packet::{
    open_packet, parse_datagram, InboundPacket, Packet, PacketNumberLength, PacketType,
};
use quicd_wire::{ConnectionId, EngineConfig, Epoch, Side, Version};

const CLIENT_INITIAL_HEX: &str = include_str!("data/rfc9001_client_initial.hex");

fn client_initial() -> Bytes {
    Bytes::from(hex::decode(CLIENT_INITIAL_HEX.trim()).unwrap())
}

fn dcid() -> ConnectionId {
    ConnectionId::from_slice(&hex::decode("8394c8f03e515708").unwrap()).unwrap()
}

#[test]
fn test_initial_secrets_match_appendix_a1() {
    let secrets = initial_secrets(&dcid(), Version::V1).unwrap();
    assert_eq!(
        hex::encode(&secrets.client),
        "c00cf151ca5be075ed0ebfb5c80323c42d6b7db67881289af4008f1f6c357aea"
    );
    assert_eq!(
        hex::encode(&secrets.server),
        "3c199828fd139efd216c155ad844cc81fb82fa8d7446fa7d78be803acdda951b"
    );

    let key = CipherSuite::Aes128GcmSha256
        .compute_key_and_iv(&secrets.client, Version::V1)
        .unwrap();
    assert_eq!(hex::encode(&key.key), "1f369613dd76d5467730efcbe3b1a22d");
    assert_eq!(hex::encode(key.iv), "fa044b2f42a3fd3b46fb255c");
}

#[test]
fn test_parse_protected_client_initial() {
    let datagram = client_initial();
    assert_eq!(datagram.len(), 1200);

    let packets = parse_datagram(&datagram, &EngineConfig::default()).unwrap();
    assert_eq!(packets.len(), 1);
    let InboundPacket::Protected(packet) = &packets[0] else {
        panic!("expected a protected packet");
    };

    assert_eq!(packet.packet_type, PacketType::Initial);
    assert_eq!(packet.version, Some(Version::V1));
    assert_eq!(packet.dcid, dcid());
    assert_eq!(packet.scid, Some(ConnectionId::empty()));
    assert!(packet.token.is_empty());
    assert_eq!(packet.pn_offset, 18);
    assert_eq!(packet.len(), 1200);
}

#[test]
fn test_open_client_initial() {
    let datagram = client_initial();
    let server = PacketProtector::initial(&dcid(), Version::V1, Side::Server).unwrap();

    let packets = parse_datagram(&datagram, &EngineConfig::default()).unwrap();
    let InboundPacket::Protected(protected) = &packets[0] else {
        panic!("expected a protected packet");
    };

    // The raw opener output carries the unprotected header of Appendix A.2
    let opened = server.open(&protected.bytes, protected.pn_offset, None).unwrap();
    assert_eq!(
        hex::encode(&opened.header),
        "c300000001088394c8f03e5157080000449e00000002"
    );
    assert_eq!(opened.packet_number, 2);
    assert_eq!(opened.payload.len(), 1162);

    let packet = open_packet(protected, &server, None).unwrap();
    let Packet::Initial(initial) = &packet else {
        panic!("expected an Initial packet");
    };
    assert_eq!(initial.header.packet_number, 2);
    assert_eq!(initial.header.pn_len, PacketNumberLength::FOUR);
    assert_eq!(initial.frames.len(), 2);

    let Frame::Crypto(crypto) = &initial.frames[0] else {
        panic!("expected a CRYPTO frame");
    };
    assert_eq!(crypto.offset, 0);
    assert_eq!(crypto.data.len(), 241);
    // ClientHello, TLS 1.2 legacy version
    assert_eq!(&crypto.data[..6], &[0x01, 0x00, 0x00, 0xed, 0x03, 0x03]);
    assert_eq!(initial.frames[1], Frame::Padding(917));
}

#[test]
fn test_reseal_client_initial_bit_exact() {
    let datagram = client_initial();
    let server = PacketProtector::initial(&dcid(), Version::V1, Side::Server).unwrap();
    let client = PacketProtector::initial(&dcid(), Version::V1, Side::Client).unwrap();
    assert_eq!(client.epoch(), Epoch::Initial);

    let packets = parse_datagram(&datagram, &EngineConfig::default()).unwrap();
    let InboundPacket::Protected(protected) = &packets[0] else {
        panic!("expected a protected packet");
    };
    let packet = open_packet(protected, &server, None).unwrap();

    let sealed = packet.seal(client.sealer().unwrap()).unwrap();
    assert_eq!(sealed.len(), 1200);
    assert_eq!(sealed.to_bytes(), datagram);
}

#[test]
fn test_client_keys_cannot_open_client_initial() {
    let datagram = client_initial();
    // A client protector opens server packets, not client ones
    let wrong = PacketProtector::initial(&dcid(), Version::V1, Side::Client).unwrap();

    let packets = parse_datagram(&datagram, &EngineConfig::default()).unwrap();
    let InboundPacket::Protected(protected) = &packets[0] else {
        panic!("expected a protected packet");
    };
    assert!(open_packet(protected, &wrong, None).is_err());
}
