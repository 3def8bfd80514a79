//! End-to-end handshake between a client and a server engine.
//!
//! A minimal driver carries out the directives: frames are sealed into real
//! packets, coalesced into datagrams, parsed and opened on the other side.
//! Handshake and 1-RTT secrets are fixed test values standing in for the
//! ones a TLS stack would export.

use bytes::Bytes;
use quicd_wire::crypto::{CipherSuite, PacketProtector};
use quicd_wire::frames::{CryptoFrame, Frame};
use quicd_wire::packet::{
    open_packet, parse_datagram, HandshakePacket, InboundPacket, InitialPacket, LongHeader,
    Packet, PacketNumberLength, ShortHeader, ShortPacket,
};
use quicd_wire::tls::{HandshakeFramer, HandshakeMessageKind};
use quicd_wire::{
    ConnectionId, ConnectionStateMachine, Directive, EngineConfig, Epoch, HandshakeState, Side,
    Version,
};
use std::sync::Arc;

const HANDSHAKE_CLIENT_SECRET: [u8; 32] = [0x11; 32];
const HANDSHAKE_SERVER_SECRET: [u8; 32] = [0x22; 32];
const APP_CLIENT_SECRET: [u8; 32] = [0x33; 32];
const APP_SERVER_SECRET: [u8; 32] = [0x44; 32];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Endpoint {
    side: Side,
    conn: ConnectionStateMachine,
    /// Protectors indexed by epoch
    keys: [PacketProtector; 3],
    /// Next packet number per epoch
    next_pn: [u64; 3],
    local_cid: ConnectionId,
    peer_cid: ConnectionId,
    /// Outbound CRYPTO offset per epoch
    crypto_offset: [u64; 3],
    config: Arc<EngineConfig>,
}

impl Endpoint {
    fn new(
        side: Side,
        original_dcid: &ConnectionId,
        local_cid: ConnectionId,
        peer_cid: ConnectionId,
    ) -> Self {
        let config = Arc::new(EngineConfig::default());
        let conn =
            ConnectionStateMachine::new(side, config.clone(), Box::new(HandshakeFramer::new()))
                .unwrap();

        let initial = PacketProtector::initial(original_dcid, Version::V1, side).unwrap();
        let mut handshake = PacketProtector::new(Epoch::Handshake, Version::V1);
        let mut application = PacketProtector::new(Epoch::Application, Version::V1);
        for (protector, client, server) in [
            (&mut handshake, &HANDSHAKE_CLIENT_SECRET, &HANDSHAKE_SERVER_SECRET),
            (&mut application, &APP_CLIENT_SECRET, &APP_SERVER_SECRET),
        ] {
            protector
                .install_key_set(CipherSuite::Aes128GcmSha256, client, Side::Client, side)
                .unwrap();
            protector
                .install_key_set(CipherSuite::Aes128GcmSha256, server, Side::Server, side)
                .unwrap();
        }

        Self {
            side,
            conn,
            keys: [initial, handshake, application],
            next_pn: [0; 3],
            local_cid,
            peer_cid,
            crypto_offset: [0; 3],
            config,
        }
    }

    /// Hand a TLS message to the engine as an outbound CRYPTO frame.
    fn write_message(&mut self, kind: HandshakeMessageKind, epoch: Epoch) -> Vec<Directive> {
        let data = HandshakeFramer::encode(kind, &[kind.as_u8(); 64]);
        let offset = self.crypto_offset[epoch.index()];
        self.crypto_offset[epoch.index()] += data.len() as u64;
        self.conn
            .process_outbound_frame(Frame::Crypto(CryptoFrame { offset, data }), epoch)
            .unwrap()
    }

    /// Seal a packet of `frames` at `epoch`.
    fn seal(&mut self, epoch: Epoch, frames: Vec<Frame>) -> Vec<u8> {
        let packet_number = self.next_pn[epoch.index()];
        self.next_pn[epoch.index()] += 1;

        let long = LongHeader {
            version: Version::V1,
            dcid: self.peer_cid.clone(),
            scid: self.local_cid.clone(),
            packet_number,
            pn_len: PacketNumberLength::TWO,
        };
        let packet = match epoch {
            Epoch::Initial => Packet::Initial(InitialPacket {
                header: long,
                token: Bytes::new(),
                frames,
            }),
            Epoch::Handshake => Packet::Handshake(HandshakePacket {
                header: long,
                frames,
            }),
            Epoch::Application => Packet::Short(ShortPacket {
                header: ShortHeader {
                    dcid: self.peer_cid.clone(),
                    spin: false,
                    key_phase: false,
                    packet_number,
                    pn_len: PacketNumberLength::TWO,
                },
                frames,
            }),
        };
        let sealer = self.keys[epoch.index()].sealer().unwrap();
        packet.seal(sealer).unwrap().to_bytes().to_vec()
    }

    /// Turn directives into a datagram, carrying out key changes.
    fn transmit(&mut self, directives: &[Directive]) -> Vec<u8> {
        let mut datagram = Vec::new();
        for directive in directives {
            match directive {
                Directive::EmitPackets(packets) => {
                    for p in packets {
                        let bytes = self.seal(p.epoch, p.frames.clone());
                        datagram.extend_from_slice(&bytes);
                    }
                }
                Directive::ForwardFrame(frame @ Frame::Crypto(_)) if self.side == Side::Client => {
                    let bytes = self.seal(Epoch::Initial, vec![frame.clone()]);
                    datagram.extend_from_slice(&bytes);
                }
                Directive::DropKeys(epoch) => self.keys[epoch.index()].drop_keys(),
                _ => {}
            }
        }
        datagram
    }

    /// Parse, open, buffer and process every packet in `datagram`.
    fn receive(&mut self, datagram: Vec<u8>) -> Vec<Directive> {
        let datagram = Bytes::from(datagram);
        let packets = parse_datagram(&datagram, &self.config).unwrap();
        for inbound in packets {
            let InboundPacket::Protected(protected) = inbound else {
                panic!("unexpected version negotiation");
            };
            let epoch = protected.packet_type.epoch().unwrap();
            let packet = open_packet(&protected, &self.keys[epoch.index()], None).unwrap();
            assert!(self.conn.buffer_inbound_packet(packet).unwrap());
        }

        let mut directives = Vec::new();
        while let Some(d) = self.conn.process_inbound_frame().unwrap() {
            directives.extend(d);
        }
        directives
    }
}

fn cid(byte: u8) -> ConnectionId {
    ConnectionId::from_slice(&[byte; 8]).unwrap()
}

#[test]
fn test_client_server_handshake() {
    init_tracing();

    let original_dcid = cid(0xaa);
    let mut client = Endpoint::new(
        Side::Client,
        &original_dcid,
        cid(0xc1),
        original_dcid.clone(),
    );
    // The server keeps answering from the DCID the client picked
    let mut server = Endpoint::new(
        Side::Server,
        &original_dcid,
        original_dcid.clone(),
        cid(0xc1),
    );

    client.conn.begin_handshake().unwrap();
    server.conn.begin_handshake().unwrap();

    // Client Initial flight
    let d = client.write_message(HandshakeMessageKind::ClientHello, Epoch::Initial);
    let datagram = client.transmit(&d);
    let d = server.receive(datagram);
    assert!(d.is_empty());
    assert_eq!(
        server.conn.handshake_state(),
        Some(HandshakeState::ProcessedClientHello)
    );

    // Server Initial + Handshake flight, coalesced into one datagram
    let mut d = server.write_message(HandshakeMessageKind::ServerHello, Epoch::Initial);
    for kind in [
        HandshakeMessageKind::EncryptedExtensions,
        HandshakeMessageKind::Certificate,
        HandshakeMessageKind::CertificateVerify,
        HandshakeMessageKind::Finished,
    ] {
        d.extend(server.write_message(kind, Epoch::Handshake));
    }
    let datagram = server.transmit(&d);
    assert!(!server.keys[0].has_sealer());

    let d = client.receive(datagram);
    assert_eq!(
        d,
        vec![
            Directive::AllowBufferedFlush(Epoch::Handshake),
            Directive::UpdateDcid,
            Directive::DropKeys(Epoch::Initial),
            Directive::AllowBufferedFlush(Epoch::Application),
        ]
    );
    assert_eq!(
        client.conn.handshake_state(),
        Some(HandshakeState::ProcessedServerFinished)
    );
    client.transmit(&d);
    assert!(!client.keys[0].has_opener());

    // Client Finished
    let d = client.write_message(HandshakeMessageKind::Finished, Epoch::Handshake);
    assert_eq!(d[1], Directive::AllowBufferedFlush(Epoch::Application));
    let datagram = client.transmit(&d);

    let d = server.receive(datagram);
    assert!(server.conn.is_active());
    assert_eq!(d[1], Directive::AllowBufferedFlush(Epoch::Application));
    assert_eq!(d.last(), Some(&Directive::InstallStreamMuxer));

    // HANDSHAKE_DONE and NEW_TOKEN in a 1-RTT packet
    let datagram = server.transmit(&d);
    let d = client.receive(datagram);
    assert!(client.conn.is_active());
    assert!(d.contains(&Directive::InstallStreamMuxer));
    assert!(d
        .iter()
        .any(|d| matches!(d, Directive::ForwardFrame(Frame::NewToken(t)) if t.token.len() == 32)));
}

#[test]
fn test_tampered_datagram_is_dropped_not_fatal() {
    init_tracing();

    let original_dcid = cid(0x0d);
    let mut client = Endpoint::new(
        Side::Client,
        &original_dcid,
        cid(0x01),
        original_dcid.clone(),
    );
    let server_initial =
        PacketProtector::initial(&original_dcid, Version::V1, Side::Server).unwrap();

    client.conn.begin_handshake().unwrap();
    let d = client.write_message(HandshakeMessageKind::ClientHello, Epoch::Initial);
    let mut datagram = client.transmit(&d);
    let last = datagram.len() - 1;
    datagram[last] ^= 0x80;

    let packets = parse_datagram(&Bytes::from(datagram), &EngineConfig::default()).unwrap();
    let InboundPacket::Protected(protected) = &packets[0] else {
        panic!("expected a protected packet");
    };
    let err = open_packet(protected, &server_initial, None).unwrap_err();
    assert!(!err.is_fatal());
}
